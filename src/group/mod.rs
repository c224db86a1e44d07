//! Groups - ordered, identity-indexed sets of records.
//!
//! A [`Group`] keeps its members in order and indexes each one by client id
//! and, once assigned, server id, so a record with a given identity appears
//! at most once. The group listens to every member: member events are
//! re-emitted on the group, a destroyed member is removed, and a member whose
//! server id changes is re-indexed.
//!
//! ## Example
//!
//! ```ignore
//! use recordset::{Group, GroupOf, ReconcileOptions};
//!
//! let persons = Group::new(GroupOf::new(Person).with_url("/persons"));
//! persons.add(json!([{"id": 1, "name": "Jon"}, {"id": 2, "name": "Richie"}]));
//!
//! // merge updates the existing record in place
//! persons.reconcile(json!({"id": 1, "name": "Jon Bon Jovi"}), ReconcileOptions::add().merge(true));
//! assert_eq!(persons.len(), 2);
//! ```

mod persist;
mod reconcile;
mod sort;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::trace;

use crate::attributes::{id_key, matches, values_equal, Attributes, IntoAttributes};
use crate::error::ConfigurationError;
use crate::events::{Event, EventData, EventHub, Events, ALL};
use crate::record::Record;
use crate::schema::{GroupSchema, Schema};
use crate::sync::Backend;

pub use reconcile::{Member, Members, ReconcileOptions, ResetOptions};
pub use sort::Comparator;

static NEXT_GROUP: AtomicU64 = AtomicU64::new(1);

/// Index key: a client id, or a server id normalized by [`id_key`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Identity {
    Client(String),
    Server(String),
}

#[derive(Default)]
struct GroupState {
    members: Vec<Record>,
    index: HashMap<Identity, Record>,
    comparator: Option<Comparator>,
}

struct GroupInner {
    cid: String,
    schema: Rc<dyn GroupSchema>,
    record_schema: Rc<dyn Schema>,
    hub: EventHub,
    backend: RefCell<Option<Backend>>,
    state: RefCell<GroupState>,
}

/// Construction options.
#[derive(Clone, Default)]
pub struct GroupOptions {
    /// Overrides the kind's record schema.
    pub record_schema: Option<Rc<dyn Schema>>,
    /// Overrides the kind's comparator.
    pub comparator: Option<Comparator>,
    pub backend: Option<Backend>,
}

impl GroupOptions {
    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = Some(comparator);
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_record_schema(mut self, schema: Rc<dyn Schema>) -> Self {
        self.record_schema = Some(schema);
        self
    }
}

/// Handle to a group. Equality is identity.
#[derive(Clone)]
pub struct Group {
    inner: Rc<GroupInner>,
}

#[derive(Clone)]
pub(crate) struct WeakGroup(Weak<GroupInner>);

impl WeakGroup {
    pub(crate) fn upgrade(&self) -> Option<Group> {
        self.0.upgrade().map(|inner| Group { inner })
    }
}

impl Group {
    pub fn new(schema: impl GroupSchema) -> Self {
        Self::with_options(Rc::new(schema), GroupOptions::default())
    }

    pub fn with_options(schema: Rc<dyn GroupSchema>, options: GroupOptions) -> Self {
        let record_schema = options
            .record_schema
            .unwrap_or_else(|| schema.record_schema());
        let comparator = options.comparator.or_else(|| schema.comparator());
        let group = Group {
            inner: Rc::new(GroupInner {
                cid: format!("g{}", NEXT_GROUP.fetch_add(1, Ordering::Relaxed)),
                schema,
                record_schema,
                hub: EventHub::new(),
                backend: RefCell::new(options.backend),
                state: RefCell::new(GroupState {
                    comparator,
                    ..GroupState::default()
                }),
            }),
        };
        group.inner.schema.initialize(&group);
        group
    }

    /// A group seeded with `records`, without firing events.
    pub fn with_records(schema: impl GroupSchema, records: impl Members) -> Self {
        let group = Self::new(schema);
        group.reset_with(records, ResetOptions::silent());
        group
    }

    pub fn cid(&self) -> &str {
        &self.inner.cid
    }

    pub fn schema(&self) -> &Rc<dyn GroupSchema> {
        &self.inner.schema
    }

    pub fn record_schema(&self) -> &Rc<dyn Schema> {
        &self.inner.record_schema
    }

    pub fn ptr_eq(&self, other: &Group) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakGroup {
        WeakGroup(Rc::downgrade(&self.inner))
    }

    pub fn url(&self) -> Result<String, ConfigurationError> {
        self.inner.schema.url().ok_or(ConfigurationError::MissingUrl)
    }

    pub fn backend(&self) -> Option<Backend> {
        self.inner.backend.borrow().clone()
    }

    pub fn set_backend(&self, backend: Backend) {
        *self.inner.backend.borrow_mut() = Some(backend);
    }

    pub fn comparator(&self) -> Option<Comparator> {
        self.inner.state.borrow().comparator.clone()
    }

    pub fn set_comparator(&self, comparator: Option<Comparator>) {
        self.inner.state.borrow_mut().comparator = comparator;
    }

    /// Server id carried by an attribute object, per the record schema.
    pub fn model_id(&self, attrs: &Attributes) -> Option<Value> {
        attrs
            .get(self.inner.record_schema.id_attribute())
            .filter(|id| !id.is_null())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.state.borrow().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the members, in order.
    pub fn members(&self) -> Vec<Record> {
        self.inner.state.borrow().members.clone()
    }

    /// Member at `index`; negative indices count from the end.
    pub fn at(&self, index: isize) -> Option<Record> {
        let state = self.inner.state.borrow();
        let index = if index < 0 {
            state.members.len().checked_sub(index.unsigned_abs())?
        } else {
            index as usize
        };
        state.members.get(index).cloned()
    }

    pub fn first(&self) -> Option<Record> {
        self.at(0)
    }

    pub fn last(&self) -> Option<Record> {
        self.at(-1)
    }

    /// Look a member up by record, attribute object, server id or client id.
    pub fn get(&self, key: impl Into<Member>) -> Option<Record> {
        self.lookup(&key.into())
    }

    fn lookup(&self, key: &Member) -> Option<Record> {
        let state = self.inner.state.borrow();
        let by_server = |id: Option<Value>| {
            id.as_ref()
                .and_then(id_key)
                .and_then(|key| state.index.get(&Identity::Server(key)))
        };
        let found = match key {
            Member::Record(record) => by_server(self.model_id(&record.attributes()))
                .or_else(|| state.index.get(&Identity::Client(record.cid().to_string()))),
            Member::Attributes(attrs) => by_server(self.model_id(attrs)),
            Member::Id(id) => by_server(Some(id.clone())).or_else(|| {
                id.as_str()
                    .and_then(|cid| state.index.get(&Identity::Client(cid.to_string())))
            }),
        };
        found.cloned()
    }

    pub fn contains(&self, record: &Record) -> bool {
        self.inner
            .state
            .borrow()
            .index
            .get(&Identity::Client(record.cid().to_string()))
            .is_some_and(|member| member.ptr_eq(record))
    }

    pub fn index_of(&self, record: &Record) -> Option<usize> {
        self.inner
            .state
            .borrow()
            .members
            .iter()
            .position(|member| member.ptr_eq(record))
    }

    /// Members whose attributes contain every entry of `attrs`.
    /// An empty query matches nothing.
    pub fn where_(&self, attrs: impl IntoAttributes, first_only: bool) -> Vec<Record> {
        let query = attrs.into_attributes();
        if query.is_empty() {
            return Vec::new();
        }
        let found = self
            .members()
            .into_iter()
            .filter(|record| matches(&record.attributes(), &query));
        if first_only {
            found.take(1).collect()
        } else {
            found.collect()
        }
    }

    pub fn find_where(&self, attrs: impl IntoAttributes) -> Option<Record> {
        self.where_(attrs, true).into_iter().next()
    }

    pub fn find(&self, predicate: impl Fn(&Record) -> bool) -> Option<Record> {
        self.members().into_iter().find(|record| predicate(record))
    }

    pub fn filter(&self, predicate: impl Fn(&Record) -> bool) -> Vec<Record> {
        self.members()
            .into_iter()
            .filter(|record| predicate(record))
            .collect()
    }

    pub fn reject(&self, predicate: impl Fn(&Record) -> bool) -> Vec<Record> {
        self.filter(|record| !predicate(record))
    }

    pub fn every(&self, predicate: impl Fn(&Record) -> bool) -> bool {
        self.members().iter().all(predicate)
    }

    pub fn some(&self, predicate: impl Fn(&Record) -> bool) -> bool {
        self.members().iter().any(predicate)
    }

    pub fn map<T>(&self, f: impl Fn(&Record) -> T) -> Vec<T> {
        self.members().iter().map(f).collect()
    }

    pub fn each(&self, f: impl Fn(&Record)) {
        self.members().iter().for_each(f)
    }

    pub fn pluck(&self, attr: &str) -> Vec<Option<Value>> {
        self.map(|record| record.get(attr))
    }

    /// Members keyed by the string form of `attr`; later members win.
    pub fn index_by(&self, attr: &str) -> HashMap<String, Record> {
        self.members()
            .into_iter()
            .filter_map(|record| {
                let key = record.get(attr)?;
                let key = id_key(&key).unwrap_or_else(|| key.to_string());
                Some((key, record))
            })
            .collect()
    }

    /// JSON array of every member's `to_json`.
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.members()
                .iter()
                .map(|record| Value::Object(record.to_json()))
                .collect(),
        )
    }

    pub fn to_array(&self) -> Vec<Attributes> {
        self.map(Record::to_json)
    }

    /// A new group of the same kind holding the same record handles.
    pub fn duplicate(&self) -> Group {
        let options = GroupOptions {
            record_schema: Some(Rc::clone(&self.inner.record_schema)),
            comparator: self.comparator(),
            backend: self.backend(),
        };
        let group = Group::with_options(Rc::clone(&self.inner.schema), options);
        group.reset_with(self.members(), ResetOptions::silent());
        group
    }

    pub(crate) fn fire(&self, name: &str, data: EventData) {
        self.inner.hub.emit(&Event::new(name, data));
    }

    /// Index `record` and start forwarding its events.
    fn add_reference(&self, record: &Record) {
        {
            let mut state = self.inner.state.borrow_mut();
            state
                .index
                .insert(Identity::Client(record.cid().to_string()), record.clone());
            if let Some(key) = self.model_id(&record.attributes()).as_ref().and_then(id_key) {
                state.index.insert(Identity::Server(key), record.clone());
            }
        }
        let group = self.downgrade();
        self.inner.hub.listen_to(record.hub(), ALL, move |event| {
            if let Some(group) = group.upgrade() {
                group.on_member_event(event);
            }
        });
    }

    /// Undo [`add_reference`](Group::add_reference). Index entries are
    /// dropped by the caller.
    fn remove_reference(&self, record: &Record) {
        if record.group().is_some_and(|group| group.ptr_eq(self)) {
            record.set_group(None);
        }
        self.inner.hub.stop_listening(Some(record.hub()), None, None);
    }

    /// Drop every index entry pointing at `record`. A silent id change is
    /// never re-keyed, so the current attributes cannot name the stale key.
    fn unindex(&self, record: &Record) {
        self.inner
            .state
            .borrow_mut()
            .index
            .retain(|_, member| !member.ptr_eq(record));
    }

    fn on_member_event(&self, event: &Event) {
        let name = event.name.as_str();
        if (name == "add" || name == "remove")
            && !event.data.group().is_some_and(|group| group.ptr_eq(self))
        {
            return;
        }
        let member = event
            .data
            .record()
            .filter(|record| self.contains(record))
            .cloned();
        match (name, member) {
            ("destroy", Some(record)) => {
                self.remove(record);
            }
            ("change", Some(record)) => self.rekey(&record),
            _ => {}
        }
        trace!(group = %self.inner.cid, event = name, "forwarding member event");
        self.inner.hub.emit(event);
    }

    /// Move a member's server-id index entry after its id changed.
    fn rekey(&self, record: &Record) {
        let id_attribute = self.inner.record_schema.id_attribute();
        let previous = record.previous(id_attribute);
        let current = record.get(id_attribute);
        if values_equal(previous.as_ref(), current.as_ref()) {
            return;
        }
        let mut state = self.inner.state.borrow_mut();
        if let Some(key) = previous.as_ref().and_then(id_key) {
            let server = Identity::Server(key);
            if state
                .index
                .get(&server)
                .is_some_and(|member| member.ptr_eq(record))
            {
                state.index.remove(&server);
            }
        }
        if let Some(key) = current.as_ref().and_then(id_key) {
            state.index.insert(Identity::Server(key), record.clone());
        }
    }
}

impl Events for Group {
    fn hub(&self) -> &EventHub {
        &self.inner.hub
    }
}

impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Group {}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Group");
        debug.field("cid", &self.inner.cid);
        if let Ok(state) = self.inner.state.try_borrow() {
            let cids: Vec<&str> = state.members.iter().map(Record::cid).collect();
            debug.field("members", &cids);
        }
        debug.finish()
    }
}

impl fmt::Debug for GroupOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupOptions")
            .field("comparator", &self.comparator)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl Serialize for Group {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::record::SetOptions;
    use crate::schema::{GroupOf, Plain};
    use serde_json::json;

    fn group() -> Group {
        Group::new(GroupOf::new(Plain).with_url("/things"))
    }

    #[test]
    fn lookup_by_every_identity() {
        let things = group();
        let added = things.add(json!({"id": 1, "name": "a"}).into_attributes()).unwrap();

        assert_eq!(things.get(json!(1)), Some(added.clone()));
        assert_eq!(things.get(json!("1")), Some(added.clone()));
        assert_eq!(things.get(added.cid()), Some(added.clone()));
        assert_eq!(things.get(added.clone()), Some(added.clone()));
        assert_eq!(things.get(json!({"id": 1})), Some(added.clone()));
        assert_eq!(things.get(Value::Null), None);
        assert_eq!(things.get(json!(2)), None);
    }

    #[test]
    fn id_change_rekeys_the_index() {
        let things = group();
        let record = things.add(json!({"name": "new"}).into_attributes()).unwrap();
        assert_eq!(things.get(json!(5)), None);

        record.set(("id", json!(5))).unwrap();
        assert_eq!(things.get(json!(5)), Some(record.clone()));

        record.set(("id", json!(6))).unwrap();
        assert_eq!(things.get(json!(5)), None);
        assert_eq!(things.get(json!(6)), Some(record));
    }

    #[test]
    fn silent_id_change_is_not_indexed_until_next_change() {
        let things = group();
        let record = things.add(json!({"name": "new"}).into_attributes()).unwrap();
        record.set_with(("id", json!(5)), SetOptions::silent()).unwrap();
        assert_eq!(things.get(json!(5)), None);
        assert_eq!(things.get(record.cid()), Some(record));
    }

    #[test]
    fn removal_after_silent_id_change_clears_old_id() {
        let things = group();
        let record = things.add(json!({"id": 1}).into_attributes()).unwrap();
        record.set_with(("id", json!(9)), SetOptions::silent()).unwrap();

        things.remove(&record);

        assert!(things.is_empty());
        assert_eq!(things.get(json!(1)), None);
        assert_eq!(things.get(json!(9)), None);
        assert_eq!(things.get(record.cid()), None);
        assert!(!things.contains(&record));
    }

    #[test]
    fn member_events_are_forwarded() {
        let things = group();
        let record = things.add(json!({"id": 1}).into_attributes()).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        things.on("all", move |event| sink.borrow_mut().push(event.name.clone()));

        record.set(("name", json!("x"))).unwrap();
        record.trigger("ping", EventData::Custom(vec![json!(1)]));
        assert_eq!(*seen.borrow(), vec!["change:name", "change", "ping"]);
    }

    #[test]
    fn removed_members_are_no_longer_forwarded() {
        let things = group();
        let record = things.add(json!({"id": 1}).into_attributes()).unwrap();
        things.remove(record.clone());

        let seen = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&seen);
        things.on("all", move |_| *sink.borrow_mut() += 1);
        record.set(("name", json!("x"))).unwrap();

        assert_eq!(*seen.borrow(), 0);
        assert!(record.group().is_none());
    }

    #[test]
    fn helpers() {
        let things = Group::with_records(
            GroupOf::new(Plain),
            json!([
                {"id": 1, "kind": "a", "n": 1},
                {"id": 2, "kind": "b", "n": 2},
                {"id": 3, "kind": "a", "n": 3}
            ]),
        );

        assert_eq!(things.len(), 3);
        assert_eq!(things.at(-1).and_then(|r| r.id()), Some(json!(3)));
        assert_eq!(things.at(-4), None);
        assert_eq!(things.first().and_then(|r| r.id()), Some(json!(1)));
        assert_eq!(things.where_(json!({"kind": "a"}), false).len(), 2);
        assert_eq!(things.where_(json!({"kind": "a"}), true).len(), 1);
        assert!(things.where_(json!({}), false).is_empty());
        assert_eq!(
            things.find_where(json!({"kind": "b"})).and_then(|r| r.id()),
            Some(json!(2))
        );
        assert_eq!(
            things.pluck("n"),
            vec![Some(json!(1)), Some(json!(2)), Some(json!(3))]
        );
        assert_eq!(things.reject(|r| r.get("kind") == Some(json!("a"))).len(), 1);
        assert!(things.every(|r| r.has("n")));
        assert!(things.some(|r| r.get("n") == Some(json!(3))));
        assert_eq!(things.index_by("kind").len(), 2);
        assert_eq!(
            things.to_json(),
            json!([
                {"id": 1, "kind": "a", "n": 1},
                {"id": 2, "kind": "b", "n": 2},
                {"id": 3, "kind": "a", "n": 3}
            ])
        );
    }

    #[test]
    fn url_requires_configuration() {
        let things = Group::new(GroupOf::new(Plain));
        assert_eq!(things.url(), Err(ConfigurationError::MissingUrl));
        assert_eq!(group().url().as_deref(), Ok("/things"));
    }

    #[test]
    fn members_use_group_url() {
        let things = group();
        let record = things.add(json!({"id": 4}).into_attributes()).unwrap();
        assert_eq!(record.url().as_deref(), Ok("/things/4"));
    }

    #[test]
    fn duplicate_shares_records() {
        let things = group();
        let record = things.add(json!({"id": 1}).into_attributes()).unwrap();
        let copy = things.duplicate();

        assert!(!copy.ptr_eq(&things));
        assert_eq!(copy.get(json!(1)), Some(record.clone()));
        assert!(record.group().is_some_and(|g| g.ptr_eq(&things)));
    }
}
