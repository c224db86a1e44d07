use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use super::{Request, Transport};
use crate::error::TransportError;

type Reply = Result<Value, TransportError>;

struct Route {
    method: String,
    url: String,
    replies: VecDeque<Reply>,
}

#[derive(Default)]
struct StubState {
    routes: Vec<Route>,
    requests: Vec<Request>,
}

/// In-memory transport answering from canned replies.
///
/// Replies are matched on wire method and URL (without the query string).
/// Several replies registered for one route are handed out in order and the
/// last one keeps answering. Unmatched requests fail with `404 Not Found`.
/// Every request is recorded, matched or not.
///
/// Clones share state, so a test can keep one handle for assertions and give
/// another to a [`Backend`](super::Backend).
#[derive(Clone, Default)]
pub struct StubTransport {
    state: Rc<RefCell<StubState>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, method: &str, url: &str, body: Value) -> &Self {
        self.push(method, url, Ok(body))
    }

    pub fn fail(&self, method: &str, url: &str, error: TransportError) -> &Self {
        self.push(method, url, Err(error))
    }

    fn push(&self, method: &str, url: &str, reply: Reply) -> &Self {
        let mut state = self.state.borrow_mut();
        let method = method.to_uppercase();
        match state
            .routes
            .iter_mut()
            .find(|route| route.method == method && route.url == url)
        {
            Some(route) => route.replies.push_back(reply),
            None => state.routes.push(Route {
                method,
                url: url.to_string(),
                replies: VecDeque::from([reply]),
            }),
        }
        self
    }

    /// Every request sent so far, oldest first.
    pub fn requests(&self) -> Vec<Request> {
        self.state.borrow().requests.clone()
    }

    pub fn last_request(&self) -> Option<Request> {
        self.state.borrow().requests.last().cloned()
    }

    pub fn request_count(&self) -> usize {
        self.state.borrow().requests.len()
    }

    fn reply(&self, request: &Request) -> Reply {
        let mut state = self.state.borrow_mut();
        state.requests.push(request.clone());
        let route = state
            .routes
            .iter_mut()
            .find(|route| route.method == request.method && route.url == request.url);
        match route {
            Some(route) if route.replies.len() > 1 => route
                .replies
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::new(404, "Not Found"))),
            Some(route) => route
                .replies
                .front()
                .cloned()
                .unwrap_or_else(|| Err(TransportError::new(404, "Not Found"))),
            None => Err(TransportError::new(404, "Not Found")),
        }
    }
}

#[async_trait(?Send)]
impl Transport for StubTransport {
    async fn send(&self, request: Request) -> Result<Value, TransportError> {
        trace!(method = %request.method, url = %request.url, "stub transport");
        self.reply(&request)
    }
}
