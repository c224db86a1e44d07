//! Error types for records, groups and their persistence.
//!
//! Three families, matching how failures are discovered:
//!
//! - [`ValidationError`]: produced by a schema's `validate` hook, purely local.
//! - [`ConfigurationError`]: a programming mistake in a record/group definition
//!   (no URL, no comparator, no transport). Reported before any request is sent.
//! - [`SyncFailure`]: a [`TransportError`] wrapped together with the record or
//!   group that issued the request.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::group::Group;
use crate::record::Record;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error returned by persistence operations.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Invalid(#[from] ValidationError),
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("{0}")]
    Transport(#[from] SyncFailure),
}

impl Error {
    pub fn is_invalid(&self) -> bool {
        matches!(self, Error::Invalid(_))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// The validation error, if this is a validation failure.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Error::Invalid(e) => Some(e),
            _ => None,
        }
    }
}

/// Value returned by a schema's `validate` hook when attributes are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
    pub field: Option<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    /// Validation error attached to a single attribute.
    pub fn for_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

/// Definition mistakes, raised synchronously and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("a \"url\" property or function must be specified")]
    MissingUrl,
    #[error("cannot sort a set without a comparator")]
    MissingComparator,
    #[error("no transport configured for {0}")]
    MissingTransport(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Failure reported by a [`Transport`](crate::Transport).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{status} {status_text}")]
pub struct TransportError {
    /// Wire status code; `0` when the request never got a response.
    pub status: u16,
    pub status_text: String,
    /// Decoded response body, when the server sent one.
    pub body: Option<Value>,
}

impl TransportError {
    pub fn new(status: u16, status_text: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            body: None,
        }
    }

    /// A failure without any response (connection refused, DNS, ...).
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(0, message)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// The object that issued a failed request.
#[derive(Clone)]
pub enum Target {
    Record(Record),
    Group(Group),
}

impl Target {
    pub fn record(&self) -> Option<&Record> {
        match self {
            Target::Record(record) => Some(record),
            Target::Group(_) => None,
        }
    }

    pub fn group(&self) -> Option<&Group> {
        match self {
            Target::Group(group) => Some(group),
            Target::Record(_) => None,
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Record(record) => write!(f, "Record({})", record.cid()),
            Target::Group(group) => write!(f, "Group({})", group.cid()),
        }
    }
}

/// A transport error wrapped with the record or group that issued the request.
///
/// Delivered both as the `Err` of the failed operation and as the payload of
/// the `"error"` event on the target.
#[derive(Debug, Clone, Error)]
#[error("sync failed for {target:?}: {status_text}")]
pub struct SyncFailure {
    pub target: Target,
    #[source]
    pub error: TransportError,
    pub status_text: String,
}

impl SyncFailure {
    pub fn new(target: Target, error: TransportError) -> Self {
        let status_text = error.status_text.clone();
        Self {
            target,
            error,
            status_text,
        }
    }

    pub fn status(&self) -> u16 {
        self.error.status
    }
}
