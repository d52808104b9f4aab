//! Server-side per-peer event registry.
//!
//! Map semantics: at most one handler is bound per event name, and binding
//! again replaces the previous handler. This is intentionally different
//! from the client bus, which keeps an ordered multi-handler list per name
//! (see [`crate::client::registry`]).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;

use super::Peer;

/// Handler invoked when a frame for a bound event arrives. Receives the
/// originating peer and the frame payload; its return value becomes the
/// `result` of an acknowledgement reply when one was requested.
pub type EventHandler = Arc<dyn Fn(Arc<Peer>, Value) -> BoxFuture<'static, Value> + Send + Sync>;

struct Binding {
    handler: EventHandler,
    once: bool,
}

/// Single-slot event registry for one server-side peer.
#[derive(Default)]
pub struct EventRegistry {
    bindings: RwLock<HashMap<String, Binding>>,
}

impl EventRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `handler` to `event`, replacing any previous binding. A
    /// binding made with `once` is removed by [`EventRegistry::resolve`]
    /// before the handler runs, so it can never fire twice.
    pub fn bind(&self, event: &str, handler: EventHandler, once: bool) {
        self.bindings
            .write()
            .insert(event.to_string(), Binding { handler, once });
    }

    /// Removes any binding for `event`. No-op when absent.
    pub fn unbind(&self, event: &str) {
        self.bindings.write().remove(event);
    }

    /// Returns the handler bound to `event`, removing the entry first when
    /// it was bound as one-shot. Returns `None` for unbound names.
    #[must_use]
    pub fn resolve(&self, event: &str) -> Option<EventHandler> {
        let mut bindings = self.bindings.write();
        let binding = bindings.get(event)?;
        let handler = Arc::clone(&binding.handler);
        if binding.once {
            bindings.remove(event);
        }
        Some(handler)
    }

    /// Returns the number of bound event names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    /// Returns `true` if no events are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("bound", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn noop_handler(marker: i64) -> EventHandler {
        Arc::new(move |_, _| Box::pin(async move { Value::from(marker) }))
    }

    #[test]
    fn resolve_unbound_returns_none() {
        let registry = EventRegistry::new();
        assert!(registry.resolve("missing").is_none());
    }

    #[test]
    fn bind_replaces_previous_handler() {
        let registry = EventRegistry::new();
        registry.bind("chat", noop_handler(1), false);
        registry.bind("chat", noop_handler(2), false);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unbind_is_noop_when_absent() {
        let registry = EventRegistry::new();
        registry.unbind("missing");
        assert!(registry.is_empty());
    }

    #[test]
    fn resolve_keeps_persistent_binding() {
        let registry = EventRegistry::new();
        registry.bind("chat", noop_handler(1), false);
        assert!(registry.resolve("chat").is_some());
        assert!(registry.resolve("chat").is_some());
    }

    #[test]
    fn once_binding_is_removed_on_resolve() {
        let registry = EventRegistry::new();
        registry.bind("chat", noop_handler(1), true);
        assert!(registry.resolve("chat").is_some());
        // Gone before the handler even runs; a second frame finds nothing.
        assert!(registry.resolve("chat").is_none());
    }
}
