#![allow(dead_code)]

pub mod person;

use std::cell::RefCell;
use std::rc::Rc;

use recordset::{Attributes, Backend, Events, IntoAttributes, StubTransport};
use serde_json::Value;

/// A stub transport plus a backend that talks to it.
pub fn stub_backend() -> (StubTransport, Backend) {
    let stub = StubTransport::new();
    let backend = Backend::new(stub.clone());
    (stub, backend)
}

/// Record every event name fired on `target`.
pub fn event_log(target: &impl Events) -> Rc<RefCell<Vec<String>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    target.on("all", move |event| sink.borrow_mut().push(event.name.clone()));
    seen
}

/// A JSON object as an attribute bag.
pub fn attrs(value: Value) -> Attributes {
    value.into_attributes()
}

pub fn count(log: &Rc<RefCell<Vec<String>>>, name: &str) -> usize {
    log.borrow().iter().filter(|seen| *seen == name).count()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
