//! Client-side listener registry.
//!
//! Unlike the server peer registry, the client bus keeps an **ordered
//! list** of listeners per event name: every listener bound to a name is
//! invoked, in insertion order. One-shot listeners are removed before they
//! run, so a replayed frame can never fire them twice.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde_json::Value;

/// Listener invoked with the payload of a matching inbound frame.
pub type Listener = Arc<dyn Fn(Value) + Send + Sync>;

/// Handle identifying one bound listener, used to remove a pending
/// one-shot binding (e.g. on ack timeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

struct Entry {
    id: ListenerId,
    listener: Listener,
    once: bool,
}

/// Ordered multi-listener registry for the client bus.
#[derive(Default)]
pub struct ListenerSet {
    next_id: AtomicU64,
    entries: RwLock<HashMap<String, Vec<Entry>>>,
}

impl ListenerSet {
    /// Creates an empty listener set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `listener` to the list bound to `event`, returning a handle
    /// for targeted removal.
    pub fn bind(&self, event: &str, listener: Listener, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .write()
            .entry(event.to_string())
            .or_default()
            .push(Entry {
                id,
                listener,
                once,
            });
        id
    }

    /// Removes every listener bound to `event`. No-op when absent.
    pub fn off(&self, event: &str) {
        self.entries.write().remove(event);
    }

    /// Removes one listener by handle. No-op when already gone.
    pub fn remove(&self, event: &str, id: ListenerId) {
        let mut entries = self.entries.write();
        if let Some(list) = entries.get_mut(event) {
            list.retain(|entry| entry.id != id);
            if list.is_empty() {
                entries.remove(event);
            }
        }
    }

    /// Returns the listeners for `event` in insertion order, removing
    /// one-shot entries from the registry before they are handed out.
    #[must_use]
    pub fn drain_matching(&self, event: &str) -> Vec<Listener> {
        let mut entries = self.entries.write();
        let Some(list) = entries.get_mut(event) else {
            return Vec::new();
        };
        let matched: Vec<Listener> = list
            .iter()
            .map(|entry| Arc::clone(&entry.listener))
            .collect();
        list.retain(|entry| !entry.once);
        if list.is_empty() {
            entries.remove(event);
        }
        matched
    }

    /// Returns the number of listeners bound to `event`.
    #[must_use]
    pub fn count(&self, event: &str) -> usize {
        self.entries.read().get(event).map_or(0, Vec::len)
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("events", &self.entries.read().len())
            .finish()
    }
}
