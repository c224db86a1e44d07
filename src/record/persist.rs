use serde_json::Value;
use tracing::debug;

use super::{Record, SetOptions};
use crate::attributes::IntoAttributes;
use crate::error::{ConfigurationError, Error, Result, SyncFailure, Target, TransportError};
use crate::events::EventData;
use crate::sync::{Backend, SyncOptions, Verb};

impl Record {
    /// Load the server representation and apply it.
    pub async fn fetch(&self) -> Result<Record> {
        self.fetch_with(SyncOptions::default()).await
    }

    pub async fn fetch_with(&self, options: SyncOptions) -> Result<Record> {
        let response = self.sync(Verb::Read, &options).await?;
        self.apply_response(response.clone(), &options)?;
        self.fire(
            "fetched",
            EventData::Fetched {
                target: Target::Record(self.clone()),
                response: Some(response),
            },
        );
        Ok(self.clone())
    }

    /// Create (new record) or update (persisted record) on the server.
    ///
    /// The record is validated first; an invalid record never reaches the
    /// transport. The response is parsed and applied, then `"sync"` fires.
    pub async fn save(&self) -> Result<Record> {
        self.save_with(SyncOptions::default()).await
    }

    pub async fn save_with(&self, options: SyncOptions) -> Result<Record> {
        if options.url.is_none() {
            self.url()?;
        }
        self.validate_current()?;

        let verb = if self.is_new() {
            Verb::Create
        } else if options.patch {
            Verb::Patch
        } else {
            Verb::Update
        };

        let mut options = options;
        if verb == Verb::Patch && options.attrs.is_none() {
            options.attrs = Some(self.changed());
        }

        let response = self.sync(verb, &options).await?;
        self.apply_response(response.clone(), &options)?;
        self.fire(
            "sync",
            EventData::Sync {
                record: self.clone(),
                response: Some(response),
            },
        );
        Ok(self.clone())
    }

    /// Delete on the server, then fire `"destroy"`.
    ///
    /// A record that was never saved fires `"destroy"` without a request.
    pub async fn destroy(&self) -> Result<Record> {
        self.destroy_with(SyncOptions::default()).await
    }

    pub async fn destroy_with(&self, options: SyncOptions) -> Result<Record> {
        if !self.is_new() {
            let response = self.sync(Verb::Delete, &options).await?;
            self.fire(
                "sync",
                EventData::Sync {
                    record: self.clone(),
                    response: Some(response),
                },
            );
        }
        self.fire(
            "destroy",
            EventData::Destroy {
                record: self.clone(),
                group: self.group(),
            },
        );
        Ok(self.clone())
    }

    fn require_backend(&self) -> Result<Backend> {
        self.backend()
            .ok_or_else(|| ConfigurationError::MissingTransport(self.cid().to_string()).into())
    }

    /// Build and send the request for `verb`.
    async fn sync(&self, verb: Verb, options: &SyncOptions) -> Result<Value> {
        let backend = self.require_backend()?;
        let url = match &options.url {
            Some(url) => url.clone(),
            None => self.url()?,
        };
        let body = verb.has_body().then(|| {
            Value::Object(options.attrs.clone().unwrap_or_else(|| self.to_json()))
        });
        let request = backend.request(verb, url, self.query_params(), body, options);

        backend
            .send(request)
            .await
            .map_err(|error| self.sync_failed(error))
    }

    fn sync_failed(&self, error: TransportError) -> Error {
        let failure = SyncFailure::new(Target::Record(self.clone()), error);
        self.fire("error", EventData::Error(failure.clone()));
        Error::Transport(failure)
    }

    /// Parse a server response and set it. Empty responses leave the record as is.
    fn apply_response(&self, response: Value, options: &SyncOptions) -> Result<()> {
        let attrs = self.schema().parse(response).into_attributes();
        debug!(
            kind = %self.schema().name(),
            cid = %self.cid(),
            keys = attrs.len(),
            "applying server attributes"
        );
        let set_options = SetOptions {
            silent: options.silent,
            ..SetOptions::default()
        };
        self.set_with(attrs, set_options).map_err(Error::Invalid)
    }
}
