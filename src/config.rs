//! Endpoint and wire configuration.
//!
//! ```ignore
//! let config = Config::from_json(r#"{
//!     "endpoint_prefix": "https://api.example.com",
//!     "endpoints": {"persons": "/persons"},
//!     "methods": {"update": "POST"}
//! }"#)?;
//!
//! assert_eq!(config.url("persons").as_deref(), Some("https://api.example.com/persons"));
//! let backend = Backend::new(transport).with_config(&config);
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::sync::{MethodMap, Verb, DEFAULT_ACCEPT};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prepended to every named endpoint.
    pub endpoint_prefix: String,
    pub endpoints: HashMap<String, String>,
    pub methods: MethodMap,
    pub accept: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint_prefix: String::new(),
            endpoints: HashMap::new(),
            methods: MethodMap::default(),
            accept: DEFAULT_ACCEPT.to_string(),
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let mut config: Config = serde_json::from_str(json)
            .map_err(|e| ConfigurationError::InvalidConfig(e.to_string()))?;
        config.normalize();
        Ok(config)
    }

    fn normalize(&mut self) {
        let methods = std::mem::take(&mut self.methods);
        for (verb, method) in [
            (Verb::Create, methods.create),
            (Verb::Read, methods.read),
            (Verb::Update, methods.update),
            (Verb::Patch, methods.patch),
            (Verb::Delete, methods.delete),
        ] {
            self.methods.set_operation(verb, method);
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.endpoint_prefix = prefix.into();
        self
    }

    pub fn with_endpoint(mut self, key: impl Into<String>, path: impl Into<String>) -> Self {
        self.endpoints.insert(key.into(), path.into());
        self
    }

    /// Prefix + the endpoint registered under `key`.
    pub fn url(&self, key: &str) -> Option<String> {
        self.endpoints
            .get(key)
            .map(|path| format!("{}{}", self.endpoint_prefix, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_from_json() {
        let config = Config::from_json(
            r#"{
                "endpoint_prefix": "https://api.example.com",
                "endpoints": {"persons": "/persons"},
                "methods": {"update": "post"}
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.url("persons").as_deref(),
            Some("https://api.example.com/persons")
        );
        assert_eq!(config.url("missing"), None);
        assert_eq!(config.methods.method(Verb::Update), "POST");
        assert_eq!(config.methods.method(Verb::Read), "GET");
        assert_eq!(config.accept, DEFAULT_ACCEPT);
    }

    #[test]
    fn rejects_malformed_json() {
        let err = Config::from_json("{not json").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidConfig(_)));
    }

    #[test]
    fn builder() {
        let config = Config::default()
            .with_prefix("/api")
            .with_endpoint("books", "/books");
        assert_eq!(config.url("books").as_deref(), Some("/api/books"));
    }
}
