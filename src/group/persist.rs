use tracing::debug;

use super::{Group, Member, ReconcileOptions};
use crate::error::{ConfigurationError, Error, Result, SyncFailure, Target};
use crate::events::EventData;
use crate::record::Record;
use crate::sync::{SyncOptions, Verb};

impl Group {
    /// Load the group's URL and reconcile against the response (add, merge
    /// and remove, with `parse`), then fire `"fetched"`.
    pub async fn fetch(&self) -> Result<Group> {
        self.fetch_with(SyncOptions::default()).await
    }

    pub async fn fetch_with(&self, options: SyncOptions) -> Result<Group> {
        let reconcile = ReconcileOptions {
            silent: options.silent,
            ..ReconcileOptions::set().parse(true)
        };
        self.fetch_into(options, reconcile).await
    }

    /// Fetch with explicit reconciliation flags, e.g. add-only paging.
    pub async fn fetch_into(
        &self,
        options: SyncOptions,
        reconcile: ReconcileOptions,
    ) -> Result<Group> {
        let backend = self.backend().ok_or_else(|| {
            Error::from(ConfigurationError::MissingTransport(self.cid().to_string()))
        })?;
        let url = match &options.url {
            Some(url) => url.clone(),
            None => self.url()?,
        };
        let request = backend.request(Verb::Read, url, options.params.clone(), None, &options);

        let response = match backend.send(request).await {
            Ok(response) => response,
            Err(error) => {
                let failure = SyncFailure::new(Target::Group(self.clone()), error);
                self.fire("error", EventData::Error(failure.clone()));
                return Err(Error::Transport(failure));
            }
        };

        let records = self.reconcile(response.clone(), reconcile);
        debug!(
            kind = %self.schema().name(),
            group = %self.cid(),
            received = records.len(),
            "fetched"
        );
        self.fire(
            "fetched",
            EventData::Fetched {
                target: Target::Group(self.clone()),
                response: Some(response),
            },
        );
        Ok(self.clone())
    }

    /// Instantiate `item`, save it, add it, then fire `"created"` on it
    /// (which the group forwards).
    ///
    /// Invalid attributes reject before any request and fire `"invalid"` on
    /// the group.
    pub async fn create(&self, item: impl Into<Member>) -> Result<Record> {
        self.create_with(item, SyncOptions::default()).await
    }

    pub async fn create_with(
        &self,
        item: impl Into<Member>,
        options: SyncOptions,
    ) -> Result<Record> {
        let record = self.prepare(item.into(), false)?;
        record.save_with(options).await?;
        self.add(record.clone());
        record.fire(
            "created",
            EventData::Created {
                record: record.clone(),
                group: self.clone(),
            },
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::attributes::{Attributes, IntoAttributes};
    use crate::error::{TransportError, ValidationError};
    use crate::events::Events;
    use crate::group::GroupOptions;
    use crate::schema::{GroupOf, Schema};
    use crate::sync::{Backend, StubTransport};
    use serde_json::json;

    struct Todo;

    impl Schema for Todo {
        fn validate(&self, attrs: &Attributes) -> Option<ValidationError> {
            attrs
                .get("title")
                .is_none()
                .then(|| ValidationError::for_field("title", "required"))
        }
    }

    fn todos(stub: &StubTransport) -> Group {
        Group::with_options(
            Rc::new(GroupOf::new(Todo).with_url("/todos")),
            GroupOptions::default().with_backend(Backend::new(stub.clone())),
        )
    }

    fn log(group: &Group) -> Rc<RefCell<Vec<String>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        group.on("all", move |event| sink.borrow_mut().push(event.name.clone()));
        seen
    }

    #[tokio::test]
    async fn fetch_reconciles_with_server() {
        let stub = StubTransport::new();
        stub.respond("GET", "/todos", json!([{"id": 1, "title": "a"}, {"id": 2, "title": "b"}]))
            .respond("GET", "/todos", json!([{"id": 2, "title": "B"}]));

        let group = todos(&stub);
        group.fetch().await.unwrap();
        assert_eq!(group.len(), 2);
        let second = group.get(json!(2)).unwrap();

        group.fetch().await.unwrap();
        assert_eq!(group.len(), 1);
        assert!(group.get(json!(2)).unwrap().ptr_eq(&second));
        assert_eq!(second.get("title"), Some(json!("B")));
    }

    #[tokio::test]
    async fn fetch_failure_fires_error_on_group() {
        let stub = StubTransport::new();
        stub.fail("GET", "/todos", TransportError::new(401, "Unauthorized"));
        let group = todos(&stub);
        let seen = log(&group);

        let err = group.fetch().await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(*seen.borrow(), vec!["error"]);
    }

    #[tokio::test]
    async fn members_inherit_the_group_backend() {
        let stub = StubTransport::new();
        stub.respond("PUT", "/todos/3", json!({"done": true}));
        let group = todos(&stub);
        let record = group.add(json!({"id": 3, "title": "x"}).into_attributes()).unwrap();

        record.save().await.unwrap();
        assert_eq!(stub.last_request().map(|r| r.url), Some("/todos/3".into()));
        assert!(record.is("done"));
    }

    #[tokio::test]
    async fn create_saves_then_adds() {
        let stub = StubTransport::new();
        stub.respond("POST", "/todos", json!({"id": 10}));
        let group = todos(&stub);
        let seen = log(&group);

        let record = group.create(json!({"title": "write docs"})).await.unwrap();
        assert_eq!(record.id(), Some(json!(10)));
        assert!(group.get(json!(10)).is_some_and(|r| r.ptr_eq(&record)));
        assert_eq!(*seen.borrow(), vec!["add", "created"]);
    }

    #[tokio::test]
    async fn create_rejects_invalid_attributes() {
        let stub = StubTransport::new();
        let group = todos(&stub);
        let seen = log(&group);

        let err = group.create(json!({"done": false})).await.unwrap_err();
        assert!(err.is_invalid());
        assert_eq!(stub.request_count(), 0);
        assert!(group.is_empty());
        assert_eq!(*seen.borrow(), vec!["invalid"]);
    }

    #[tokio::test]
    async fn fetch_without_backend_is_a_configuration_error() {
        let group = Group::new(GroupOf::new(Todo).with_url("/todos"));
        let err = group.fetch().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::MissingTransport(_))
        ));
    }
}
