use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use super::{Event, EventData, ALL};

pub type Callback = Rc<dyn Fn(&Event)>;

static NEXT_HANDLER: AtomicU64 = AtomicU64::new(1);
static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Identifies one registration made by `on`, `once` or `listen_to`.
///
/// A registration spanning several space-separated names shares one id, so
/// `off(None, Some(id), None)` removes it from every name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Identifies the subscriber side of a registration.
///
/// Every hub has its own context; `listen_to` tags the callbacks it installs
/// on the source with the listener's context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    pub fn new() -> Self {
        ContextId(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct Handler {
    id: HandlerId,
    callback: Callback,
    context: Option<ContextId>,
    fired: Option<Rc<Cell<bool>>>,
}

struct HubInner {
    context: ContextId,
    handlers: RefCell<HashMap<String, Vec<Handler>>>,
    listening_to: RefCell<HashMap<ContextId, Weak<HubInner>>>,
}

/// Synchronous, re-entrant publish/subscribe hub.
///
/// Cloning yields another handle to the same hub.
#[derive(Clone)]
pub struct EventHub {
    inner: Rc<HubInner>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.inner.handlers.borrow();
        let mut names: Vec<_> = handlers.keys().collect();
        names.sort();
        f.debug_struct("EventHub")
            .field("context", &self.inner.context)
            .field("events", &names)
            .finish()
    }
}

fn split_names(names: &str) -> impl Iterator<Item = &str> {
    names.split_whitespace()
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(HubInner {
                context: ContextId::new(),
                handlers: RefCell::new(HashMap::new()),
                listening_to: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// The context this hub uses when it listens to other hubs.
    pub fn context(&self) -> ContextId {
        self.inner.context
    }

    pub fn ptr_eq(&self, other: &EventHub) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn register(
        &self,
        names: &str,
        callback: Callback,
        context: Option<ContextId>,
        once: bool,
    ) -> HandlerId {
        let id = HandlerId(NEXT_HANDLER.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.inner.handlers.borrow_mut();
        for name in split_names(names) {
            handlers.entry(name.to_string()).or_default().push(Handler {
                id,
                callback: Rc::clone(&callback),
                context,
                fired: once.then(|| Rc::new(Cell::new(false))),
            });
        }
        id
    }

    pub fn on(&self, names: &str, callback: impl Fn(&Event) + 'static) -> HandlerId {
        self.register(names, Rc::new(callback), None, false)
    }

    /// Register on behalf of a subscriber context.
    pub fn on_with_context(
        &self,
        names: &str,
        context: ContextId,
        callback: impl Fn(&Event) + 'static,
    ) -> HandlerId {
        self.register(names, Rc::new(callback), Some(context), false)
    }

    /// Register several callbacks at once from `(name, callback)` pairs.
    pub fn on_map<'a>(
        &self,
        map: impl IntoIterator<Item = (&'a str, Callback)>,
    ) -> Vec<HandlerId> {
        map.into_iter()
            .map(|(name, callback)| self.register(name, callback, None, false))
            .collect()
    }

    /// Each of the space-separated names fires the callback at most once.
    pub fn once(&self, names: &str, callback: impl Fn(&Event) + 'static) -> HandlerId {
        self.register(names, Rc::new(callback), None, true)
    }

    /// Remove matching registrations.
    ///
    /// With every filter `None` all callbacks are dropped. Without `handler`
    /// every callback for `name` goes; without `context` the context is ignored.
    pub fn off(&self, name: Option<&str>, handler: Option<HandlerId>, context: Option<ContextId>) {
        let mut handlers = self.inner.handlers.borrow_mut();
        if name.is_none() && handler.is_none() && context.is_none() {
            handlers.clear();
            return;
        }

        let names: Vec<String> = match name {
            Some(names) => split_names(names).map(str::to_string).collect(),
            None => handlers.keys().cloned().collect(),
        };

        for name in names {
            let Some(list) = handlers.get_mut(&name) else {
                continue;
            };
            list.retain(|h| {
                let id_matches = handler.map_or(true, |id| id == h.id);
                let ctx_matches = context.map_or(true, |ctx| Some(ctx) == h.context);
                !(id_matches && ctx_matches)
            });
            if list.is_empty() {
                handlers.remove(&name);
            }
        }
    }

    /// Fire each space-separated name: its own callbacks first, then `"all"`.
    pub fn trigger(&self, names: &str, data: EventData) {
        for name in split_names(names) {
            self.emit(&Event::new(name, data.clone()));
        }
    }

    /// Dispatch an already-built event, keeping its name.
    pub fn emit(&self, event: &Event) {
        let (named, all) = {
            let handlers = self.inner.handlers.borrow();
            (
                handlers.get(&event.name).cloned().unwrap_or_default(),
                handlers.get(ALL).cloned().unwrap_or_default(),
            )
        };
        if named.is_empty() && all.is_empty() {
            return;
        }

        trace!(event = %event.name, listeners = named.len() + all.len(), "dispatch");
        self.dispatch(&event.name, named, event);
        self.dispatch(ALL, all, event);
    }

    fn dispatch(&self, list_name: &str, handlers: Vec<Handler>, event: &Event) {
        for handler in handlers {
            if let Some(fired) = &handler.fired {
                if fired.replace(true) {
                    continue;
                }
                self.remove_entry(list_name, handler.id);
            }
            (handler.callback)(event);
        }
    }

    fn remove_entry(&self, name: &str, id: HandlerId) {
        let mut handlers = self.inner.handlers.borrow_mut();
        if let Some(list) = handlers.get_mut(name) {
            list.retain(|h| h.id != id);
            if list.is_empty() {
                handlers.remove(name);
            }
        }
    }

    /// Subscribe to `source` on behalf of this hub.
    pub fn listen_to(
        &self,
        source: &EventHub,
        names: &str,
        callback: impl Fn(&Event) + 'static,
    ) -> HandlerId {
        self.track(source);
        source.register(names, Rc::new(callback), Some(self.context()), false)
    }

    pub fn listen_to_once(
        &self,
        source: &EventHub,
        names: &str,
        callback: impl Fn(&Event) + 'static,
    ) -> HandlerId {
        self.track(source);
        source.register(names, Rc::new(callback), Some(self.context()), true)
    }

    fn track(&self, source: &EventHub) {
        self.inner
            .listening_to
            .borrow_mut()
            .insert(source.context(), Rc::downgrade(&source.inner));
    }

    /// Remove callbacks this hub installed with `listen_to`.
    pub fn stop_listening(
        &self,
        source: Option<&EventHub>,
        name: Option<&str>,
        handler: Option<HandlerId>,
    ) {
        let sources: Vec<(ContextId, Weak<HubInner>)> = {
            let listening = self.inner.listening_to.borrow();
            match source {
                Some(source) => listening
                    .get(&source.context())
                    .map(|weak| vec![(source.context(), weak.clone())])
                    .unwrap_or_default(),
                None => listening
                    .iter()
                    .map(|(ctx, weak)| (*ctx, weak.clone()))
                    .collect(),
            }
        };

        let own = self.context();
        for (ctx, weak) in sources {
            let still_listening = match weak.upgrade() {
                Some(inner) => {
                    let source = EventHub { inner };
                    source.off(name, handler, Some(own));
                    source.has_context(own)
                }
                None => false,
            };
            if !still_listening {
                self.inner.listening_to.borrow_mut().remove(&ctx);
            }
        }
    }

    fn has_context(&self, context: ContextId) -> bool {
        self.inner
            .handlers
            .borrow()
            .values()
            .flatten()
            .any(|h| h.context == Some(context))
    }

    /// Number of live sources this hub is listening to.
    pub fn listening_count(&self) -> usize {
        let own = self.context();
        self.inner
            .listening_to
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .filter(|inner| (EventHub { inner: Rc::clone(inner) }).has_context(own))
            .count()
    }

    /// Number of callbacks registered for `name` (not counting `"all"`).
    pub fn listener_count(&self, name: &str) -> usize {
        self.inner
            .handlers
            .borrow()
            .get(name)
            .map_or(0, Vec::len)
    }

    pub fn has_listeners(&self) -> bool {
        !self.inner.handlers.borrow().is_empty()
    }
}
