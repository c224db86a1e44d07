//! Schemas - the declared kind of a record or group.
//!
//! A record kind is a type implementing [`Schema`]; every hook has a default,
//! so a kind only overrides what differs from the base (URL root, defaults,
//! validation, ...). `#[derive(Schema)]` writes the impl from declarative
//! `#[schema(...)]` descriptors.
//!
//! ## Example
//!
//! ```ignore
//! use recordset::{Attributes, Schema, ValidationError};
//!
//! struct Person;
//!
//! impl Schema for Person {
//!     fn url_root(&self) -> Option<String> {
//!         Some("/persons".into())
//!     }
//!
//!     fn validate(&self, attrs: &Attributes) -> Option<ValidationError> {
//!         attrs.get("name").is_none().then(|| ValidationError::new("name is required"))
//!     }
//! }
//! ```

use std::rc::Rc;

use serde_json::Value;

use crate::attributes::Attributes;
use crate::error::ValidationError;
use crate::group::{Comparator, Group};
use crate::record::Record;

/// Hooks describing a record kind.
pub trait Schema: 'static {
    /// Human readable kind name, used in logs.
    fn name(&self) -> &str {
        "record"
    }

    /// Attribute holding the server-assigned id.
    fn id_attribute(&self) -> &str {
        "id"
    }

    /// Attributes every new record starts with; constructor input wins.
    fn defaults(&self) -> Attributes {
        Attributes::new()
    }

    /// Base URL for records of this kind; the id is appended for persisted records.
    fn url_root(&self) -> Option<String> {
        None
    }

    /// Full URL override. Returning `Some` bypasses `url_root` resolution.
    fn url(&self, _record: &Record) -> Option<String> {
        None
    }

    /// Check a prospective attribute set. `Some` rejects it.
    fn validate(&self, _attrs: &Attributes) -> Option<ValidationError> {
        None
    }

    /// Convert a server response into attributes.
    fn parse(&self, response: Value) -> Value {
        response
    }

    /// Query parameter rules sent with every request.
    ///
    /// A string value starting with `@` reads the attribute at that path, one
    /// starting with `=` calls [`call`](Schema::call) with the rest of the
    /// string as the method name; anything else is sent as-is.
    fn query_params(&self) -> Attributes {
        Attributes::new()
    }

    /// Named zero-argument methods reachable from `=` query rules.
    fn call(&self, _method: &str, _record: &Record) -> Option<Value> {
        None
    }

    /// Keys of embedded records/groups serialized into `to_json`.
    fn serialize_nested(&self) -> Vec<String> {
        Vec::new()
    }

    /// Runs once at the end of construction.
    fn initialize(&self, _record: &Record) {}
}

/// Hooks describing a group kind.
pub trait GroupSchema: 'static {
    /// Schema used to instantiate bare attribute objects added to the group.
    fn record_schema(&self) -> Rc<dyn Schema>;

    fn name(&self) -> &str {
        "group"
    }

    fn url(&self) -> Option<String> {
        None
    }

    /// Convert a fetch response into an array of attribute objects.
    fn parse(&self, response: Value) -> Value {
        response
    }

    /// Ordering maintained after every add or merge.
    fn comparator(&self) -> Option<Comparator> {
        None
    }

    fn initialize(&self, _group: &Group) {}
}

/// Plain group kind: a record schema plus an optional URL and comparator.
pub struct GroupOf {
    record_schema: Rc<dyn Schema>,
    url: Option<String>,
    comparator: Option<Comparator>,
}

impl GroupOf {
    pub fn new(record_schema: impl Schema) -> Self {
        Self::from_schema(Rc::new(record_schema))
    }

    pub fn from_schema(record_schema: Rc<dyn Schema>) -> Self {
        Self {
            record_schema,
            url: None,
            comparator: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = Some(comparator);
        self
    }
}

impl GroupSchema for GroupOf {
    fn record_schema(&self) -> Rc<dyn Schema> {
        Rc::clone(&self.record_schema)
    }

    fn url(&self) -> Option<String> {
        self.url.clone()
    }

    fn comparator(&self) -> Option<Comparator> {
        self.comparator.clone()
    }
}

/// Schema with every hook at its default. Useful for ad-hoc records.
#[derive(Clone, Copy, Debug, Default)]
pub struct Plain;

impl Schema for Plain {}

/// A resolved query-parameter rule.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryRule {
    Attribute(String),
    Method(String),
    Literal(Value),
}

impl QueryRule {
    pub fn parse(rule: &Value) -> Self {
        match rule {
            Value::String(s) => {
                if let Some(path) = s.strip_prefix('@') {
                    QueryRule::Attribute(path.to_string())
                } else if let Some(method) = s.strip_prefix('=') {
                    QueryRule::Method(method.to_string())
                } else {
                    QueryRule::Literal(rule.clone())
                }
            }
            other => QueryRule::Literal(other.clone()),
        }
    }
}
