use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use super::Group;
use crate::attributes::{Attributes, IntoAttributes};
use crate::error::{Target, ValidationError};
use crate::events::EventData;
use crate::record::{Record, RecordOptions, SetOptions};

/// One input item for [`Group::reconcile`] and friends.
#[derive(Clone, Debug)]
pub enum Member {
    Record(Record),
    Attributes(Attributes),
    /// A bare server id, or a client id string.
    Id(Value),
}

impl Member {
    fn attributes(&self) -> Attributes {
        match self {
            Member::Record(record) => record.attributes(),
            Member::Attributes(attrs) => attrs.clone(),
            Member::Id(_) => Attributes::new(),
        }
    }
}

impl From<Record> for Member {
    fn from(record: Record) -> Self {
        Member::Record(record)
    }
}

impl From<&Record> for Member {
    fn from(record: &Record) -> Self {
        Member::Record(record.clone())
    }
}

impl From<Attributes> for Member {
    fn from(attrs: Attributes) -> Self {
        Member::Attributes(attrs)
    }
}

impl From<Value> for Member {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(attrs) => Member::Attributes(attrs),
            other => Member::Id(other),
        }
    }
}

impl From<&str> for Member {
    fn from(id: &str) -> Self {
        Member::Id(Value::String(id.to_string()))
    }
}

/// Input shapes accepted by [`Group::reconcile`], [`Group::add`],
/// [`Group::remove`] and [`Group::reset`].
///
/// Singular inputs (`Record`, `&Record`, [`Member`], [`Attributes`]) produce
/// `Option<Record>`. Plural inputs (`Vec<_>`, `&[Record]` and any JSON
/// [`Value`]) produce `Vec<Record>`.
pub trait Members {
    type Output;

    fn into_members(self) -> Vec<Member>;

    /// Like `into_members`, running raw JSON through the group's `parse` hook first.
    fn into_parsed_members(self, _group: &Group) -> Vec<Member>
    where
        Self: Sized,
    {
        self.into_members()
    }

    fn shape(results: Vec<Option<Record>>) -> Self::Output;
}

fn single(results: Vec<Option<Record>>) -> Option<Record> {
    results.into_iter().next().flatten()
}

fn plural(results: Vec<Option<Record>>) -> Vec<Record> {
    results.into_iter().flatten().collect()
}

impl Members for Record {
    type Output = Option<Record>;

    fn into_members(self) -> Vec<Member> {
        vec![Member::Record(self)]
    }

    fn shape(results: Vec<Option<Record>>) -> Self::Output {
        single(results)
    }
}

impl Members for &Record {
    type Output = Option<Record>;

    fn into_members(self) -> Vec<Member> {
        vec![Member::Record(self.clone())]
    }

    fn shape(results: Vec<Option<Record>>) -> Self::Output {
        single(results)
    }
}

impl Members for Member {
    type Output = Option<Record>;

    fn into_members(self) -> Vec<Member> {
        vec![self]
    }

    fn shape(results: Vec<Option<Record>>) -> Self::Output {
        single(results)
    }
}

impl Members for Attributes {
    type Output = Option<Record>;

    fn into_members(self) -> Vec<Member> {
        vec![Member::Attributes(self)]
    }

    fn shape(results: Vec<Option<Record>>) -> Self::Output {
        single(results)
    }
}

/// A JSON array yields its items, `null` yields nothing and any other value is
/// one item. The output is always a `Vec`, even for a lone object: the shape
/// of a `Value` is only known at runtime. Convert with
/// [`IntoAttributes`] to get an `Option<Record>` back.
impl Members for Value {
    type Output = Vec<Record>;

    fn into_members(self) -> Vec<Member> {
        match self {
            Value::Array(items) => items.into_iter().map(Member::from).collect(),
            Value::Null => Vec::new(),
            other => vec![Member::from(other)],
        }
    }

    fn into_parsed_members(self, group: &Group) -> Vec<Member> {
        group.schema().parse(self).into_members()
    }

    fn shape(results: Vec<Option<Record>>) -> Self::Output {
        plural(results)
    }
}

impl<T: Into<Member>> Members for Vec<T> {
    type Output = Vec<Record>;

    fn into_members(self) -> Vec<Member> {
        self.into_iter().map(Into::into).collect()
    }

    fn shape(results: Vec<Option<Record>>) -> Self::Output {
        plural(results)
    }
}

impl Members for &[Record] {
    type Output = Vec<Record>;

    fn into_members(self) -> Vec<Member> {
        self.iter().cloned().map(Member::Record).collect()
    }

    fn shape(results: Vec<Option<Record>>) -> Self::Output {
        plural(results)
    }
}

/// Flags for [`Group::reconcile`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Insert items that match no member.
    pub add: bool,
    /// Remove members that match no item.
    pub remove: bool,
    /// Update matched members with the item's attributes.
    pub merge: bool,
    /// Insert new members starting at this position; negative counts from
    /// the end. Disables comparator sorting for the call.
    pub at: Option<isize>,
    /// Sort with the comparator after inserting.
    pub sort: bool,
    pub silent: bool,
    /// Run `parse` hooks over raw input.
    pub parse: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self::set()
    }
}

impl ReconcileOptions {
    /// Full reconciliation: add, remove and merge.
    pub fn set() -> Self {
        Self {
            add: true,
            remove: true,
            merge: true,
            at: None,
            sort: true,
            silent: false,
            parse: false,
        }
    }

    /// Add only; existing members are left untouched.
    pub fn add() -> Self {
        Self {
            remove: false,
            merge: false,
            ..Self::set()
        }
    }

    pub fn merge(mut self, merge: bool) -> Self {
        self.merge = merge;
        self
    }

    pub fn remove(mut self, remove: bool) -> Self {
        self.remove = remove;
        self
    }

    pub fn at(mut self, at: isize) -> Self {
        self.at = Some(at);
        self
    }

    pub fn sort(mut self, sort: bool) -> Self {
        self.sort = sort;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn parse(mut self, parse: bool) -> Self {
        self.parse = parse;
        self
    }
}

/// Flags for [`Group::reset_with`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResetOptions {
    pub silent: bool,
    pub parse: bool,
}

impl ResetOptions {
    pub fn silent() -> Self {
        Self {
            silent: true,
            parse: false,
        }
    }
}

impl Group {
    /// Reconcile the group against `input` (the diffing `set`).
    ///
    /// Items matching a member by identity are merged into it (when `merge`),
    /// unmatched items become new members (when `add`), and members matching
    /// no item are removed (when `remove`). Every record ends up at most once
    /// in the group. Fires `remove` (via [`remove`](Group::remove)), then
    /// `add` per new member, then `sort` once if the result differs from the
    /// surviving members with the new ones appended.
    ///
    /// When the same identity appears more than once in `input`, the first
    /// occurrence fixes its position and later occurrences merge into it.
    ///
    /// The return shape follows [`Members`]: a JSON [`Value`] always gives a
    /// `Vec`, so pass [`Attributes`] for a single `Option<Record>`.
    pub fn reconcile<M: Members>(&self, input: M, options: ReconcileOptions) -> M::Output {
        let items = if options.parse {
            input.into_parsed_members(self)
        } else {
            input.into_members()
        };
        M::shape(self.reconcile_members(items, &options))
    }

    fn reconcile_members(
        &self,
        items: Vec<Member>,
        options: &ReconcileOptions,
    ) -> Vec<Option<Record>> {
        let len = self.len();
        let at = options.at.map(|at| {
            if at < 0 {
                len.saturating_sub(at.unsigned_abs() - 1)
            } else {
                (at as usize).min(len)
            }
        });

        let comparator = self.comparator();
        let sortable = comparator.is_some() && at.is_none() && options.sort;
        let sort_attr = comparator
            .as_ref()
            .and_then(|c| c.attribute_name())
            .map(str::to_string);

        let mut results = Vec::with_capacity(items.len());
        let mut to_add: Vec<Record> = Vec::new();
        let mut kept: HashSet<String> = HashSet::new();
        let mut placed: HashSet<String> = HashSet::new();
        let mut order: Option<Vec<Record>> =
            (!sortable && options.add && options.remove).then(Vec::new);
        let mut sort = false;

        for item in items {
            let record = match self.lookup(&item) {
                Some(existing) => {
                    if options.remove {
                        kept.insert(existing.cid().to_string());
                    }
                    let same_handle = matches!(&item, Member::Record(r) if r.ptr_eq(&existing));
                    if options.merge && !same_handle {
                        let mut attrs = item.attributes();
                        if options.parse {
                            attrs = existing
                                .schema()
                                .parse(Value::Object(attrs))
                                .into_attributes();
                        }
                        sort |= self.merge_into(&existing, attrs, options, sortable, sort_attr.as_deref());
                    }
                    existing
                }
                None if options.add => match self.prepare(item, options.parse) {
                    // parsing can reveal an id that is already a member
                    Ok(record) => match self.lookup(&Member::Record(record.clone())) {
                        Some(existing) => {
                            if options.remove {
                                kept.insert(existing.cid().to_string());
                            }
                            if options.merge {
                                sort |= self.merge_into(
                                    &existing,
                                    record.attributes(),
                                    options,
                                    sortable,
                                    sort_attr.as_deref(),
                                );
                            }
                            existing
                        }
                        None => {
                            self.add_reference(&record);
                            to_add.push(record.clone());
                            record
                        }
                    },
                    Err(_) => {
                        results.push(None);
                        continue;
                    }
                },
                None => {
                    results.push(None);
                    continue;
                }
            };

            if let Some(order) = order.as_mut() {
                if placed.insert(record.cid().to_string()) {
                    order.push(record.clone());
                }
            }
            results.push(Some(record));
        }

        let mut removed = 0;
        if options.remove {
            let stale: Vec<Record> = self
                .members()
                .into_iter()
                .filter(|member| !kept.contains(member.cid()))
                .collect();
            removed = stale.len();
            if !stale.is_empty() {
                self.remove_with(stale, options.silent);
            }
        }

        // measured against a plain append to the survivors, so removals alone
        // never count as a reorder
        let order_changed = order.as_ref().is_some_and(|order| {
            let appended: Vec<Record> = self
                .members()
                .into_iter()
                .chain(to_add.iter().cloned())
                .collect();
            order.len() != appended.len()
                || order.iter().zip(&appended).any(|(a, b)| !a.ptr_eq(b))
        });

        if !to_add.is_empty() || order_changed {
            if sortable {
                sort = true;
            }
            let mut state = self.inner.state.borrow_mut();
            match (at, order.take()) {
                (Some(at), _) => {
                    for (offset, record) in to_add.iter().enumerate() {
                        let position = (at + offset).min(state.members.len());
                        state.members.insert(position, record.clone());
                    }
                }
                (None, Some(order)) => state.members = order,
                (None, None) => state.members.extend(to_add.iter().cloned()),
            }
        }

        if sort {
            self.apply_sort();
        }

        if !options.silent {
            for (offset, record) in to_add.iter().enumerate() {
                record.fire(
                    "add",
                    EventData::Add {
                        record: record.clone(),
                        group: self.clone(),
                        index: at.map(|at| at + offset),
                    },
                );
            }
            if sort || order_changed {
                self.fire("sort", EventData::Sort { group: self.clone() });
            }
        }

        debug!(
            kind = %self.inner.schema.name(),
            group = %self.inner.cid,
            added = to_add.len(),
            removed,
            total = self.len(),
            "reconciled"
        );
        results
    }

    /// Set `attrs` on a matched member; returns whether the sort key changed.
    fn merge_into(
        &self,
        existing: &Record,
        attrs: Attributes,
        options: &ReconcileOptions,
        sortable: bool,
        sort_attr: Option<&str>,
    ) -> bool {
        let set_options = SetOptions {
            silent: options.silent,
            ..SetOptions::default()
        };
        existing.set_with(attrs, set_options).is_ok()
            && sortable
            && existing.has_changed(sort_attr)
    }

    /// Turn an input item into a record owned by this group.
    ///
    /// Attribute objects are instantiated with the record schema; rejected
    /// attributes fire `"invalid"` on the group.
    pub(crate) fn prepare(&self, item: Member, parse: bool) -> Result<Record, ValidationError> {
        let attrs = match item {
            Member::Record(record) => {
                if record.group().is_none() {
                    record.set_group(Some(self));
                }
                return Ok(record);
            }
            Member::Attributes(attrs) => attrs,
            Member::Id(id) => {
                let mut attrs = Attributes::new();
                attrs.insert(self.record_schema().id_attribute().to_string(), id);
                attrs
            }
        };

        let mut record_options = RecordOptions::default().in_group(self);
        record_options.parse = parse;
        let record = Record::with_options(self.record_schema().clone(), attrs, record_options);
        match record.validation_error() {
            None => Ok(record),
            Some(error) => {
                self.fire(
                    "invalid",
                    EventData::Invalid {
                        target: Target::Group(self.clone()),
                        error: error.clone(),
                    },
                );
                Err(error)
            }
        }
    }

    /// Add without removing or (by default) merging.
    ///
    /// `add(json!({..}))` returns a one-element `Vec`;
    /// `add(json!({..}).into_attributes())` returns `Option<Record>`.
    pub fn add<M: Members>(&self, input: M) -> M::Output {
        self.reconcile(input, ReconcileOptions::add())
    }

    /// Add with caller flags; `add` is forced on and `remove` off.
    pub fn add_with<M: Members>(&self, input: M, options: ReconcileOptions) -> M::Output {
        let options = ReconcileOptions {
            add: true,
            remove: false,
            ..options
        };
        self.reconcile(input, options)
    }

    /// Remove the members matching `input`; unknown items are ignored.
    pub fn remove<M: Members>(&self, input: M) -> M::Output {
        M::shape(self.remove_members(input.into_members(), false))
    }

    pub fn remove_with<M: Members>(&self, input: M, silent: bool) -> M::Output {
        M::shape(self.remove_members(input.into_members(), silent))
    }

    fn remove_members(&self, items: Vec<Member>, silent: bool) -> Vec<Option<Record>> {
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let Some(record) = self.lookup(&item) else {
                results.push(None);
                continue;
            };
            self.unindex(&record);
            let index = {
                let mut state = self.inner.state.borrow_mut();
                let index = state.members.iter().position(|m| m.ptr_eq(&record));
                if let Some(index) = index {
                    state.members.remove(index);
                }
                index
            };
            if let Some(index) = index.filter(|_| !silent) {
                record.fire(
                    "remove",
                    EventData::Remove {
                        record: record.clone(),
                        group: self.clone(),
                        index,
                    },
                );
            }
            self.remove_reference(&record);
            results.push(Some(record));
        }
        results
    }

    /// Replace every member with `input`, firing a single `reset`.
    pub fn reset<M: Members>(&self, input: M) -> M::Output {
        self.reset_with(input, ResetOptions::default())
    }

    pub fn reset_with<M: Members>(&self, input: M, options: ResetOptions) -> M::Output {
        let previous = {
            let mut state = self.inner.state.borrow_mut();
            state.index.clear();
            std::mem::take(&mut state.members)
        };
        for record in &previous {
            self.remove_reference(record);
        }

        let added = self.add_with(
            input,
            ReconcileOptions::add().silent().parse(options.parse),
        );
        if !options.silent {
            self.fire(
                "reset",
                EventData::Reset {
                    group: self.clone(),
                    previous,
                },
            );
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::events::Events;
    use crate::schema::{GroupOf, Plain, Schema};
    use serde_json::json;

    fn group() -> Group {
        Group::new(GroupOf::new(Plain))
    }

    fn ids(group: &Group) -> Vec<Value> {
        group.map(|r| r.id().unwrap_or(Value::Null))
    }

    fn log(group: &Group) -> Rc<RefCell<Vec<String>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        group.on("all", move |event| sink.borrow_mut().push(event.name.clone()));
        seen
    }

    #[test]
    fn add_is_idempotent_by_identity() {
        let things = group();
        things.add(json!([{"id": 1}, {"id": 2}]));
        things.add(json!([{"id": 2}, {"id": 1}, {"id": 3}]));
        assert_eq!(ids(&things), vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn same_record_twice_is_one_member() {
        let things = group();
        let record = Record::new(Plain, json!({"name": "x"}));
        things.add(vec![record.clone(), record.clone()]);
        assert_eq!(things.len(), 1);
    }

    #[test]
    fn singular_and_plural_results() {
        let things = group();
        let one: Option<Record> = things.add(Record::new(Plain, json!({"id": 1})));
        let many: Vec<Record> = things.add(json!([{"id": 2}, {"id": 3}]));
        assert!(one.is_some());
        assert_eq!(many.len(), 2);

        // any JSON value is plural, even a lone object
        let object: Vec<Record> = things.add(json!({"id": 4}));
        assert_eq!(object.len(), 1);
        let attrs: Option<Record> = things.add(json!({"id": 5}).into_attributes());
        assert!(attrs.is_some_and(|r| r.id() == Some(json!(5))));
    }

    #[test]
    fn merge_updates_in_place() {
        let things = group();
        let original = things.add(json!({"id": 1, "name": "A"}).into_attributes()).unwrap();

        let merged = things.add_with(json!([{"id": 1, "name": "X"}]), ReconcileOptions::add().merge(true));
        assert!(merged[0].ptr_eq(&original));
        assert_eq!(original.get("name"), Some(json!("X")));
        assert_eq!(things.len(), 1);
    }

    #[test]
    fn no_merge_leaves_existing_untouched() {
        let things = group();
        let original = things.add(json!({"id": 1, "name": "A"}).into_attributes()).unwrap();

        let result = things.add(json!([{"id": 1, "name": "X"}]));
        assert!(result[0].ptr_eq(&original));
        assert_eq!(original.get("name"), Some(json!("A")));
    }

    #[test]
    fn full_reconcile_adds_merges_and_removes() {
        let things = group();
        things.add(json!([{"id": 1, "v": 1}, {"id": 2, "v": 1}, {"id": 3, "v": 1}]));
        let seen = log(&things);

        things.reconcile(json!([{"id": 3, "v": 2}, {"id": 4, "v": 1}]), ReconcileOptions::set());

        assert_eq!(ids(&things), vec![json!(3), json!(4)]);
        assert_eq!(things.get(json!(3)).and_then(|r| r.get("v")), Some(json!(2)));
        assert_eq!(
            *seen.borrow(),
            vec!["change:v", "change", "remove", "remove", "add"]
        );
    }

    #[test]
    fn removal_alone_is_not_a_reorder() {
        let things = group();
        things.add(json!([{"id": 1}, {"id": 2}, {"id": 3}]));
        let seen = log(&things);

        things.reconcile(json!([{"id": 2}, {"id": 3}]), ReconcileOptions::set());

        assert_eq!(ids(&things), vec![json!(2), json!(3)]);
        assert_eq!(*seen.borrow(), vec!["remove"]);
    }

    #[test]
    fn new_member_ahead_of_survivors_is_a_reorder() {
        let things = group();
        things.add(json!([{"id": 1}, {"id": 2}]));
        let seen = log(&things);

        things.reconcile(json!([{"id": 3}, {"id": 2}]), ReconcileOptions::set());

        assert_eq!(ids(&things), vec![json!(3), json!(2)]);
        assert_eq!(*seen.borrow(), vec!["remove", "add", "sort"]);
    }

    #[test]
    fn reconcile_follows_input_order() {
        let things = group();
        things.add(json!([{"id": 1}, {"id": 2}, {"id": 3}]));
        let seen = log(&things);

        things.reconcile(json!([{"id": 3}, {"id": 1}, {"id": 2}]), ReconcileOptions::set());
        assert_eq!(ids(&things), vec![json!(3), json!(1), json!(2)]);
        assert_eq!(*seen.borrow(), vec!["sort"]);
    }

    #[test]
    fn unchanged_reconcile_is_quiet() {
        let things = group();
        things.add(json!([{"id": 1}, {"id": 2}]));
        let seen = log(&things);

        things.reconcile(json!([{"id": 1}, {"id": 2}]), ReconcileOptions::set());
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn duplicate_ids_in_input_keep_first_position() {
        let things = group();
        things.reconcile(
            json!([{"id": 1, "v": "a"}, {"id": 2}, {"id": 1, "v": "b"}]),
            ReconcileOptions::set(),
        );
        assert_eq!(ids(&things), vec![json!(1), json!(2)]);
        assert_eq!(things.get(json!(1)).and_then(|r| r.get("v")), Some(json!("b")));
    }

    #[test]
    fn insert_at_position() {
        let things = group();
        things.add(json!([{"id": 1}, {"id": 2}]));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        things.on("add", move |event| {
            if let EventData::Add { index, .. } = &event.data {
                sink.borrow_mut().push(*index);
            }
        });

        things.add_with(json!([{"id": 8}, {"id": 9}]), ReconcileOptions::add().at(1));
        assert_eq!(ids(&things), vec![json!(1), json!(8), json!(9), json!(2)]);
        assert_eq!(*seen.borrow(), vec![Some(1), Some(2)]);

        things.add_with(json!({"id": 7}), ReconcileOptions::add().at(-1));
        assert_eq!(things.last().and_then(|r| r.id()), Some(json!(7)));
    }

    #[test]
    fn invalid_items_are_skipped() {
        struct Named;
        impl Schema for Named {
            fn validate(&self, attrs: &Attributes) -> Option<ValidationError> {
                attrs
                    .get("name")
                    .is_none()
                    .then(|| ValidationError::new("name required"))
            }
        }

        let things = Group::new(GroupOf::new(Named));
        let seen = log(&things);
        let added = things.add(json!([{"name": "ok"}, {"id": 2}]));

        assert_eq!(added.len(), 1);
        assert_eq!(things.len(), 1);
        assert_eq!(*seen.borrow(), vec!["invalid", "add"]);
    }

    #[test]
    fn remove_fires_with_index_and_ignores_strangers() {
        let things = group();
        things.add(json!([{"id": 1}, {"id": 2}]));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        things.on("remove", move |event| {
            if let EventData::Remove { index, .. } = &event.data {
                sink.borrow_mut().push(*index);
            }
        });

        let removed = things.remove(json!([2, 5]));
        assert_eq!(removed.len(), 1);
        assert_eq!(*seen.borrow(), vec![1]);
        assert_eq!(things.remove(json!(2)), Vec::<Record>::new());
    }

    #[test]
    fn foreign_add_events_are_not_forwarded() {
        let first = group();
        let second = group();
        let record = first.add(json!({"id": 1}).into_attributes()).unwrap();
        let seen = log(&first);

        second.add(record.clone());
        assert!(seen.borrow().is_empty());
        assert!(record.group().is_some_and(|g| g.ptr_eq(&first)));
    }

    #[test]
    fn reset_replaces_members() {
        let things = group();
        let old = things.add(json!({"id": 1}).into_attributes()).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        things.on("all", move |event| {
            if let EventData::Reset { previous, .. } = &event.data {
                sink.borrow_mut().push(previous.len());
            }
            sink.borrow_mut().push(usize::MAX);
        });

        things.reset(json!([{"id": 2}, {"id": 3}]));
        assert_eq!(ids(&things), vec![json!(2), json!(3)]);
        assert_eq!(*seen.borrow(), vec![1, usize::MAX]);
        assert!(old.group().is_none());
        assert_eq!(things.get(json!(1)), None);
    }

    #[test]
    fn reset_round_trips_to_json() {
        let things = group();
        let payload = json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]);
        things.reset(payload.clone());
        assert_eq!(things.to_json(), payload);
    }

    #[test]
    fn parse_option_runs_group_and_record_hooks() {
        struct Renamed;
        impl Schema for Renamed {
            fn parse(&self, response: Value) -> Value {
                let mut attrs = response.into_attributes();
                if let Some(count) = attrs.shift_remove("count") {
                    attrs.insert("n".into(), count);
                }
                Value::Object(attrs)
            }
        }
        struct Paged;
        impl crate::schema::GroupSchema for Paged {
            fn record_schema(&self) -> Rc<dyn Schema> {
                Rc::new(Renamed)
            }
            fn parse(&self, response: Value) -> Value {
                response.get("items").cloned().unwrap_or(Value::Null)
            }
        }

        let things = Group::new(Paged);
        things.reconcile(
            json!({"items": [{"id": 1, "count": 1}]}),
            ReconcileOptions::set().parse(true),
        );
        assert_eq!(things.get(json!(1)).and_then(|r| r.get("n")), Some(json!(1)));

        things.reconcile(
            json!({"items": [{"id": 1, "count": 2}]}),
            ReconcileOptions::set().parse(true),
        );
        assert_eq!(things.len(), 1);
        assert_eq!(things.get(json!(1)).and_then(|r| r.get("n")), Some(json!(2)));
    }
}
