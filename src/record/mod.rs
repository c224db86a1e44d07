//! Records - observable attribute bags with change tracking and persistence.
//!
//! A [`Record`] is a cheap handle; clones share the same attributes, events
//! and identity. Each record carries a process-unique client id (`cid`) and,
//! once the server has assigned one, a server id read from the schema's id
//! attribute.
//!
//! ## Example
//!
//! ```ignore
//! use recordset::{Events, Record};
//!
//! let ann = Record::new(Person, json!({"name": "Ann"}));
//! assert!(ann.is_new());
//!
//! ann.on("change:name", |event| println!("{:?}", event.data.value()));
//! ann.set(("name", json!("Anne")))?;
//! assert_eq!(ann.previous("name"), Some(json!("Ann")));
//! ```

mod mutation;
mod persist;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

use crate::attributes::{id_key, is_truthy, resolve_path, Attributes, IntoAttributes};
use crate::error::{ConfigurationError, ValidationError};
use crate::events::{Event, EventData, EventHub, Events};
use crate::group::{Group, WeakGroup};
use crate::schema::{QueryRule, Schema};
use crate::sync::{encode_uri_component, Backend};

pub use mutation::{Phase, SetOptions};

static NEXT_CID: AtomicU64 = AtomicU64::new(1);

fn next_cid() -> String {
    format!("c{}", NEXT_CID.fetch_add(1, Ordering::Relaxed))
}

/// Construction options.
#[derive(Clone, Debug, Default)]
pub struct RecordOptions {
    /// Run the schema's `parse` hook over the constructor input.
    pub parse: bool,
    /// Owning group; used for URL and backend fallback.
    pub group: Option<Group>,
    pub backend: Option<Backend>,
}

impl RecordOptions {
    pub fn parse(mut self) -> Self {
        self.parse = true;
        self
    }

    pub fn in_group(mut self, group: &Group) -> Self {
        self.group = Some(group.clone());
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }
}

/// A record or group embedded under one of a record's keys.
#[derive(Clone, Debug)]
pub enum Nested {
    Record(Record),
    Group(Group),
}

impl Nested {
    pub fn to_json(&self) -> Value {
        match self {
            Nested::Record(record) => Value::Object(record.to_json()),
            Nested::Group(group) => group.to_json(),
        }
    }
}

impl From<Record> for Nested {
    fn from(record: Record) -> Self {
        Nested::Record(record)
    }
}

impl From<Group> for Nested {
    fn from(group: Group) -> Self {
        Nested::Group(group)
    }
}

#[derive(Default)]
struct RecordState {
    attributes: Attributes,
    /// Attributes as they were before the current (or last) outermost `set`.
    previous: Attributes,
    /// Keys that differ from `previous`; unset keys are stored as `null`.
    changed: Attributes,
    id: Option<Value>,
    validation_error: Option<ValidationError>,
    phase: Phase,
    pending: Option<SetOptions>,
}

struct RecordInner {
    cid: String,
    schema: Rc<dyn Schema>,
    hub: EventHub,
    state: RefCell<RecordState>,
    group: RefCell<Option<WeakGroup>>,
    backend: RefCell<Option<Backend>>,
    nested: RefCell<HashMap<String, Nested>>,
    query: RefCell<Attributes>,
}

/// Handle to a record. Equality is identity.
#[derive(Clone)]
pub struct Record {
    inner: Rc<RecordInner>,
}

/// Non-owning record handle.
#[derive(Clone)]
pub struct WeakRecord(Weak<RecordInner>);

impl WeakRecord {
    pub fn upgrade(&self) -> Option<Record> {
        self.0.upgrade().map(|inner| Record { inner })
    }
}

impl Record {
    pub fn new(schema: impl Schema, attrs: impl IntoAttributes) -> Self {
        Self::with_options(Rc::new(schema), attrs, RecordOptions::default())
    }

    pub fn from_schema(schema: Rc<dyn Schema>, attrs: impl IntoAttributes) -> Self {
        Self::with_options(schema, attrs, RecordOptions::default())
    }

    /// Build a record: parse (if asked), lay the schema defaults under the
    /// input, apply it with a regular `set`, then forget the construction
    /// changes and run the schema's `initialize` hook.
    ///
    /// Input rejected by validation leaves the record empty with its
    /// `validation_error` set.
    pub fn with_options(
        schema: Rc<dyn Schema>,
        attrs: impl IntoAttributes,
        options: RecordOptions,
    ) -> Self {
        let record = Record {
            inner: Rc::new(RecordInner {
                cid: next_cid(),
                schema,
                hub: EventHub::new(),
                state: RefCell::new(RecordState::default()),
                group: RefCell::new(options.group.as_ref().map(Group::downgrade)),
                backend: RefCell::new(options.backend),
                nested: RefCell::new(HashMap::new()),
                query: RefCell::new(Attributes::new()),
            }),
        };

        let mut attrs = attrs.into_attributes();
        if options.parse {
            attrs = record
                .inner
                .schema
                .parse(Value::Object(attrs))
                .into_attributes();
        }
        for (key, value) in record.inner.schema.defaults() {
            attrs.entry(key).or_insert(value);
        }

        if let Err(error) = record.set(attrs) {
            debug!(cid = %record.inner.cid, %error, "constructed with invalid attributes");
        }
        record.inner.state.borrow_mut().changed.clear();
        record.inner.schema.initialize(&record);
        record
    }

    pub fn cid(&self) -> &str {
        &self.inner.cid
    }

    pub fn schema(&self) -> &Rc<dyn Schema> {
        &self.inner.schema
    }

    /// Server id, `None` until one is assigned.
    pub fn id(&self) -> Option<Value> {
        self.inner.state.borrow().id.clone()
    }

    pub fn is_new(&self) -> bool {
        self.inner.state.borrow().id.is_none()
    }

    pub fn get(&self, attr: &str) -> Option<Value> {
        self.inner.state.borrow().attributes.get(attr).cloned()
    }

    /// Dotted-path lookup (`"author.name"`).
    pub fn get_path(&self, path: &str) -> Option<Value> {
        resolve_path(&self.inner.state.borrow().attributes, path).cloned()
    }

    /// Whether the attribute is present and not `null`.
    pub fn has(&self, attr: &str) -> bool {
        self.inner
            .state
            .borrow()
            .attributes
            .get(attr)
            .is_some_and(|value| !value.is_null())
    }

    /// Truthiness of an attribute.
    pub fn is(&self, attr: &str) -> bool {
        is_truthy(self.inner.state.borrow().attributes.get(attr))
    }

    pub fn attributes(&self) -> Attributes {
        self.inner.state.borrow().attributes.clone()
    }

    pub fn validation_error(&self) -> Option<ValidationError> {
        self.inner.state.borrow().validation_error.clone()
    }

    pub fn ptr_eq(&self, other: &Record) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakRecord {
        WeakRecord(Rc::downgrade(&self.inner))
    }

    /// The group this record belongs to, if it is still alive.
    pub fn group(&self) -> Option<Group> {
        self.inner
            .group
            .borrow()
            .as_ref()
            .and_then(WeakGroup::upgrade)
    }

    pub(crate) fn set_group(&self, group: Option<&Group>) {
        *self.inner.group.borrow_mut() = group.map(Group::downgrade);
    }

    /// Own backend, else the owning group's.
    pub fn backend(&self) -> Option<Backend> {
        self.inner
            .backend
            .borrow()
            .clone()
            .or_else(|| self.group().and_then(|group| group.backend()))
    }

    pub fn set_backend(&self, backend: Backend) {
        *self.inner.backend.borrow_mut() = Some(backend);
    }

    /// Resource URL: `url_root` (or the owning group's URL), plus the encoded
    /// id for persisted records.
    pub fn url(&self) -> Result<String, ConfigurationError> {
        if let Some(url) = self.inner.schema.url(self) {
            return Ok(url);
        }
        let base = match self.inner.schema.url_root() {
            Some(root) => root,
            None => self
                .group()
                .ok_or(ConfigurationError::MissingUrl)?
                .url()?,
        };
        let Some(id) = self.id() else {
            return Ok(base);
        };
        let id = id_key(&id).unwrap_or_else(|| id.to_string());
        let separator = if base.ends_with('/') { "" } else { "/" };
        Ok(format!("{base}{separator}{}", encode_uri_component(&id)))
    }

    /// Resolve the schema's query rules plus instance overrides.
    pub fn query_params(&self) -> Attributes {
        let mut rules = self.inner.schema.query_params();
        for (key, rule) in self.inner.query.borrow().iter() {
            rules.insert(key.clone(), rule.clone());
        }

        let mut params = Attributes::new();
        for (key, rule) in rules {
            let value = match QueryRule::parse(&rule) {
                QueryRule::Attribute(path) => self.get_path(&path),
                QueryRule::Method(name) => {
                    Some(self.inner.schema.call(&name, self).unwrap_or(Value::Null))
                }
                QueryRule::Literal(value) => Some(value),
            };
            if let Some(value) = value {
                params.insert(key, value);
            }
        }
        params
    }

    /// Override a query rule for this record only; `None` drops the parameter.
    pub fn set_query_param(&self, key: impl Into<String>, rule: Option<Value>) {
        self.inner
            .query
            .borrow_mut()
            .insert(key.into(), rule.unwrap_or(Value::Null));
    }

    pub fn embed(&self, key: impl Into<String>, nested: impl Into<Nested>) {
        self.inner
            .nested
            .borrow_mut()
            .insert(key.into(), nested.into());
    }

    pub fn embedded(&self, key: &str) -> Option<Nested> {
        self.inner.nested.borrow().get(key).cloned()
    }

    /// Attributes plus every key in the schema's serialize list.
    pub fn to_json(&self) -> Attributes {
        let mut json = self.attributes();
        for key in self.inner.schema.serialize_nested() {
            let value = self
                .embedded(&key)
                .map(|nested| nested.to_json())
                .unwrap_or(Value::Null);
            json.insert(key, value);
        }
        json
    }

    /// A new record of the same schema and attributes, with a fresh cid.
    pub fn duplicate(&self) -> Record {
        let options = RecordOptions {
            backend: self.inner.backend.borrow().clone(),
            ..RecordOptions::default()
        };
        Record::with_options(Rc::clone(&self.inner.schema), self.attributes(), options)
    }

    /// Detach from the owning group. Returns whether anything was removed.
    pub fn remove(&self) -> bool {
        match self.group() {
            Some(group) => group.remove(self.clone()).is_some(),
            None => false,
        }
    }

    pub(crate) fn fire(&self, name: &str, data: EventData) {
        self.inner.hub.emit(&Event::new(name, data));
    }
}

impl Events for Record {
    fn hub(&self) -> &EventHub {
        &self.inner.hub
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Record {}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Record");
        debug.field("cid", &self.inner.cid);
        if let Ok(state) = self.inner.state.try_borrow() {
            debug.field("id", &state.id);
            debug.field("attributes", &state.attributes);
        }
        debug.finish()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
