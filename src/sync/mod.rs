//! Sync - mapping CRUD verbs onto wire requests.
//!
//! Records and groups never talk to the network directly. They build a
//! [`Request`] through a [`Backend`] (a [`Transport`] plus the verb → method
//! table) and hand it to the transport, which resolves with the decoded JSON
//! body or a [`TransportError`].
//!
//! ## Example
//!
//! ```ignore
//! use recordset::{Backend, StubTransport, Verb};
//!
//! let stub = StubTransport::new();
//! stub.respond("GET", "/persons/1", json!({"id": 1, "name": "Ann"}));
//!
//! let backend = Backend::new(stub.clone()).with_operation(Verb::Update, "POST");
//! ```

#[cfg(feature = "http")]
mod http;
mod stub;

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::attributes::Attributes;
use crate::config::Config;
use crate::error::TransportError;

#[cfg(feature = "http")]
pub use http::ReqwestTransport;
pub use stub::StubTransport;

/// Default `Accept` header sent with every request.
pub const DEFAULT_ACCEPT: &str = "application/json, text/plain, */*";

/// The five persistence verbs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Create,
    Read,
    Update,
    Patch,
    Delete,
}

impl Verb {
    /// Whether requests for this verb carry the record's JSON as a body.
    pub fn has_body(self) -> bool {
        matches!(self, Verb::Create | Verb::Update | Verb::Patch)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verb::Create => "create",
            Verb::Read => "read",
            Verb::Update => "update",
            Verb::Patch => "patch",
            Verb::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Verb → wire method table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodMap {
    pub create: String,
    pub read: String,
    pub update: String,
    pub patch: String,
    pub delete: String,
}

impl Default for MethodMap {
    fn default() -> Self {
        Self {
            create: "POST".into(),
            read: "GET".into(),
            update: "PUT".into(),
            patch: "PATCH".into(),
            delete: "DELETE".into(),
        }
    }
}

impl MethodMap {
    pub fn method(&self, verb: Verb) -> &str {
        match verb {
            Verb::Create => &self.create,
            Verb::Read => &self.read,
            Verb::Update => &self.update,
            Verb::Patch => &self.patch,
            Verb::Delete => &self.delete,
        }
    }

    /// Remap a single verb.
    pub fn set_operation(&mut self, verb: Verb, method: impl Into<String>) {
        let slot = match verb {
            Verb::Create => &mut self.create,
            Verb::Read => &mut self.read,
            Verb::Update => &mut self.update,
            Verb::Patch => &mut self.patch,
            Verb::Delete => &mut self.delete,
        };
        *slot = method.into().to_uppercase();
    }
}

/// A fully assembled wire request.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub verb: Verb,
    pub method: String,
    pub url: String,
    pub params: Attributes,
    pub headers: BTreeMap<String, String>,
    /// JSON-encoded body for create/update/patch.
    pub body: Option<String>,
}

impl Request {
    /// Query parameters as string pairs; `null` values are dropped.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect()
    }

    /// URL with the encoded query string appended.
    pub fn full_url(&self) -> String {
        let query = self
            .query_pairs()
            .iter()
            .map(|(key, value)| {
                format!("{}={}", encode_uri_component(key), encode_uri_component(value))
            })
            .collect::<Vec<_>>()
            .join("&");
        if query.is_empty() {
            self.url.clone()
        } else if self.url.contains('?') {
            format!("{}&{}", self.url, query)
        } else {
            format!("{}?{}", self.url, query)
        }
    }

    /// The body decoded back into JSON.
    pub fn json_body(&self) -> Option<Value> {
        self.body
            .as_deref()
            .and_then(|body| serde_json::from_str(body).ok())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Something that can carry a [`Request`] to a server.
///
/// Futures are `!Send`: records and groups are single-threaded handles.
#[async_trait(?Send)]
pub trait Transport {
    async fn send(&self, request: Request) -> Result<Value, TransportError>;
}

/// Per-call overrides for fetch/save/destroy.
#[derive(Clone, Debug, Default)]
pub struct SyncOptions {
    pub url: Option<String>,
    /// Wire method override, e.g. `"POST"` for a tunnelled update.
    pub method: Option<String>,
    /// Extra query parameters; they win over the schema's query rules.
    pub params: Attributes,
    pub headers: BTreeMap<String, String>,
    /// Body override for create/update/patch.
    pub attrs: Option<Attributes>,
    /// Save a persisted record with the `patch` verb.
    pub patch: bool,
    /// Apply the server response without firing change events.
    pub silent: bool,
}

impl SyncOptions {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = Some(attrs);
        self
    }

    pub fn patch(mut self) -> Self {
        self.patch = true;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

/// A transport together with its verb table and default headers.
#[derive(Clone)]
pub struct Backend {
    transport: Rc<dyn Transport>,
    methods: MethodMap,
    accept: String,
}

impl Backend {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::from_rc(Rc::new(transport))
    }

    pub fn from_rc(transport: Rc<dyn Transport>) -> Self {
        Self {
            transport,
            methods: MethodMap::default(),
            accept: DEFAULT_ACCEPT.to_string(),
        }
    }

    /// Take the method table and accept header from `config`.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.methods = config.methods.clone();
        self.accept = config.accept.clone();
        self
    }

    pub fn with_operation(mut self, verb: Verb, method: impl Into<String>) -> Self {
        self.methods.set_operation(verb, method);
        self
    }

    pub fn methods(&self) -> &MethodMap {
        &self.methods
    }

    /// Assemble a request. `params` are the target's dynamic query params;
    /// caller-supplied params and headers from `options` win.
    pub fn request(
        &self,
        verb: Verb,
        url: String,
        params: Attributes,
        body: Option<Value>,
        options: &SyncOptions,
    ) -> Request {
        let method = options
            .method
            .clone()
            .unwrap_or_else(|| self.methods.method(verb).to_string());

        let mut merged = params;
        for (key, value) in &options.params {
            merged.insert(key.clone(), value.clone());
        }

        let mut headers = BTreeMap::new();
        headers.insert("Accept".to_string(), self.accept.clone());
        let body = body.filter(|_| verb.has_body()).map(|body| body.to_string());
        if body.is_some() {
            headers.insert(
                "Content-Type".to_string(),
                "application/json;charset=utf-8".to_string(),
            );
        }
        for (name, value) in &options.headers {
            headers.insert(name.clone(), value.clone());
        }

        Request {
            verb,
            method,
            url,
            params: merged,
            headers,
            body,
        }
    }

    pub async fn send(&self, request: Request) -> Result<Value, TransportError> {
        debug!(verb = %request.verb, method = %request.method, url = %request.url, "sending request");
        let method = request.method.clone();
        let url = request.url.clone();
        match self.transport.send(request).await {
            Ok(body) => Ok(body),
            Err(error) => {
                warn!(%method, %url, status = error.status, "request failed: {}", error.status_text);
                Err(error)
            }
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("methods", &self.methods)
            .field("accept", &self.accept)
            .finish_non_exhaustive()
    }
}

/// Percent-encode everything except the characters `encodeURIComponent`
/// leaves alone: `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
pub fn encode_uri_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
