//! Event Dispatch
//!
//! Typed publish/subscribe registry keyed by event kind. Handlers run
//! synchronously in registration order; a panicking handler is isolated and
//! logged so it cannot block delivery to the remaining handlers.

use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

/// An event that can be routed by kind.
pub trait Event {
    type Kind: Copy + Eq + Hash + std::fmt::Debug;

    fn kind(&self) -> Self::Kind;
}

/// Opaque handle returned by [`EventDispatcher::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Per-kind handler registry.
pub struct EventDispatcher<E: Event> {
    handlers: HashMap<E::Kind, Vec<(HandlerId, Handler<E>)>>,
    next_id: u64,
}

impl<E: Event> EventDispatcher<E> {
    pub fn new() -> Self {
        EventDispatcher {
            handlers: HashMap::new(),
            next_id: 0,
        }
    }

    /// Registers a handler for one event kind.
    pub fn on<F>(&mut self, kind: E::Kind, handler: F) -> HandlerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.handlers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Removes a handler. Returns false if the id is unknown.
    pub fn off(&mut self, id: HandlerId) -> bool {
        for list in self.handlers.values_mut() {
            if let Some(index) = list.iter().position(|(entry, _)| *entry == id) {
                list.remove(index);
                return true;
            }
        }
        false
    }

    /// Dispatches an event to all handlers registered for its kind.
    pub fn emit(&self, event: &E) {
        let Some(list) = self.handlers.get(&event.kind()) else {
            return;
        };
        for (id, handler) in list {
            let handler = Arc::clone(handler);
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!(?id, kind = ?event.kind(), "event handler panicked; continuing delivery");
            }
        }
    }

    /// Returns the number of handlers registered for a kind.
    pub fn handler_count(&self, kind: E::Kind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Removes all handlers.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

impl<E: Event> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}
