//! Observable records and identity-indexed groups of records.
//!
//! - [`Record`]: an attribute bag with change tracking, validation and
//!   re-entrant change events.
//! - [`Group`]: an ordered set of records, indexed by client and server id,
//!   that reconciles itself against incoming data.
//! - [`EventHub`]: the per-instance publish/subscribe both are built on.
//! - [`Transport`] / [`Backend`]: how records and groups reach a server.

extern crate self as recordset;

mod attributes;
mod config;
mod error;
mod events;
mod group;
mod record;
mod schema;
mod sync;

pub use attributes::{
    compare_values, id_key, is_truthy, resolve_path, values_equal, Attributes, IntoAttributes,
};
pub use config::Config;
pub use error::{
    ConfigurationError, Error, Result, SyncFailure, Target, TransportError, ValidationError,
};
pub use events::{Callback, ContextId, Event, EventData, EventHub, Events, HandlerId, ALL};
pub use group::{
    Comparator, Group, GroupOptions, Member, Members, ReconcileOptions, ResetOptions,
};
pub use record::{Nested, Phase, Record, RecordOptions, SetOptions, WeakRecord};
pub use schema::{GroupOf, GroupSchema, Plain, QueryRule, Schema};
#[cfg(feature = "http")]
pub use sync::ReqwestTransport;
pub use sync::{
    encode_uri_component, Backend, MethodMap, Request, StubTransport, SyncOptions, Transport,
    Verb, DEFAULT_ACCEPT,
};

#[cfg(feature = "derive")]
pub use recordset_macros::Schema;

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}
