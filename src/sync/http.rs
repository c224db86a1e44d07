use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;

use super::{Request, Transport};
use crate::error::TransportError;

/// HTTP transport backed by `reqwest`.
///
/// Relative request URLs are resolved against `base_url`.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn absolute(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}{}", self.base_url.trim_end_matches('/'), url)
        }
    }
}

#[async_trait(?Send)]
impl Transport for ReqwestTransport {
    async fn send(&self, request: Request) -> Result<Value, TransportError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportError::network(e.to_string()))?;

        let mut builder = self
            .client
            .request(method, self.absolute(&request.url))
            .query(&request.query_pairs());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::network(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::network(e.to_string()))?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        if status.is_success() {
            Ok(body)
        } else {
            let reason = status.canonical_reason().unwrap_or_default();
            Err(TransportError::new(status.as_u16(), reason).with_body(body))
        }
    }
}
