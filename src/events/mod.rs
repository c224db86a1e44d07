//! Events - per-instance publish/subscribe for records and groups.
//!
//! Every [`Record`] and [`Group`] owns its own [`EventHub`]. Callbacks are
//! dispatched synchronously, in registration order, and may re-enter the hub
//! (trigger, subscribe or unsubscribe) from inside a callback.
//!
//! ## Example
//!
//! ```ignore
//! use recordset::{Events, Record};
//!
//! let record = Record::new(Person, json!({"name": "Ann"}));
//! record.on("change:name", |event| {
//!     println!("renamed to {:?}", event.data.value());
//! });
//! record.set(("name", json!("Bob")))?;
//! ```

mod hub;

use serde_json::Value;

use crate::error::{SyncFailure, Target, ValidationError};
use crate::group::Group;
use crate::record::Record;

pub use hub::{Callback, ContextId, EventHub, HandlerId};

/// Name reserved for subscribing to every event a hub fires.
pub const ALL: &str = "all";

/// A fired event: its name plus a typed payload.
///
/// Subscribers to [`ALL`] receive the same value, so they can read the
/// concrete event name from `name`.
#[derive(Clone, Debug)]
pub struct Event {
    pub name: String,
    pub data: EventData,
}

impl Event {
    pub fn new(name: impl Into<String>, data: EventData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Payload carried by an [`Event`].
#[derive(Clone, Debug)]
pub enum EventData {
    /// `change:<attr>` - the attribute's value after the change (`None` once unset).
    Change { record: Record, value: Option<Value> },
    /// `change` - fired once per mutation batch.
    Changed { record: Record },
    /// `invalid` - a validation hook rejected attributes.
    Invalid { target: Target, error: ValidationError },
    /// `sync` - the server acknowledged a save or delete.
    Sync { record: Record, response: Option<Value> },
    /// `fetched` - a fetch applied the server representation.
    Fetched { target: Target, response: Option<Value> },
    /// `destroy` - the record was destroyed; `group` is the group it belonged to.
    Destroy { record: Record, group: Option<Group> },
    /// `error` - a request failed.
    Error(SyncFailure),
    /// `add` - `index` is set when the caller inserted at an explicit position.
    Add {
        record: Record,
        group: Group,
        index: Option<usize>,
    },
    /// `remove` - `index` is the position the record was removed from.
    Remove {
        record: Record,
        group: Group,
        index: usize,
    },
    /// `reset` - the members the group held before the reset.
    Reset { group: Group, previous: Vec<Record> },
    /// `sort`
    Sort { group: Group },
    /// `created` - a record was saved through a group and added to it.
    Created { record: Record, group: Group },
    /// Application-defined events.
    Custom(Vec<Value>),
}

impl EventData {
    /// The record this event concerns, if any.
    pub fn record(&self) -> Option<&Record> {
        match self {
            EventData::Change { record, .. }
            | EventData::Changed { record }
            | EventData::Sync { record, .. }
            | EventData::Destroy { record, .. }
            | EventData::Add { record, .. }
            | EventData::Remove { record, .. }
            | EventData::Created { record, .. } => Some(record),
            EventData::Invalid { target, .. } | EventData::Fetched { target, .. } => {
                target.record()
            }
            EventData::Error(failure) => failure.target.record(),
            EventData::Reset { .. } | EventData::Sort { .. } | EventData::Custom(_) => None,
        }
    }

    /// The group this event concerns, if any.
    pub fn group(&self) -> Option<&Group> {
        match self {
            EventData::Add { group, .. }
            | EventData::Remove { group, .. }
            | EventData::Reset { group, .. }
            | EventData::Sort { group }
            | EventData::Created { group, .. } => Some(group),
            EventData::Destroy { group, .. } => group.as_ref(),
            EventData::Invalid { target, .. } | EventData::Fetched { target, .. } => {
                target.group()
            }
            EventData::Error(failure) => failure.target.group(),
            _ => None,
        }
    }

    /// The new value carried by a `change:<attr>` event.
    pub fn value(&self) -> Option<&Value> {
        match self {
            EventData::Change { value, .. } => value.as_ref(),
            _ => None,
        }
    }
}

/// Subscription surface shared by everything that owns an [`EventHub`].
pub trait Events {
    fn hub(&self) -> &EventHub;

    /// Subscribe to one or more space-separated event names.
    fn on(&self, names: &str, callback: impl Fn(&Event) + 'static) -> HandlerId {
        self.hub().on(names, callback)
    }

    /// Like [`on`](Events::on), but each name fires at most once.
    fn once(&self, names: &str, callback: impl Fn(&Event) + 'static) -> HandlerId {
        self.hub().once(names, callback)
    }

    /// Remove callbacks. `None` filters match everything.
    fn off(&self, name: Option<&str>, handler: Option<HandlerId>, context: Option<ContextId>) {
        self.hub().off(name, handler, context)
    }

    fn trigger(&self, names: &str, data: EventData) {
        self.hub().trigger(names, data)
    }

    /// Subscribe to `source`, keeping the bookkeeping on `self`.
    fn listen_to<S: Events + ?Sized>(
        &self,
        source: &S,
        names: &str,
        callback: impl Fn(&Event) + 'static,
    ) -> HandlerId {
        self.hub().listen_to(source.hub(), names, callback)
    }

    fn listen_to_once<S: Events + ?Sized>(
        &self,
        source: &S,
        names: &str,
        callback: impl Fn(&Event) + 'static,
    ) -> HandlerId {
        self.hub().listen_to_once(source.hub(), names, callback)
    }

    /// Drop subscriptions made with `listen_to`; `None` source means every source.
    fn stop_listening(
        &self,
        source: Option<&EventHub>,
        name: Option<&str>,
        handler: Option<HandlerId>,
    ) {
        self.hub().stop_listening(source, name, handler)
    }
}

impl Events for EventHub {
    fn hub(&self) -> &EventHub {
        self
    }
}
