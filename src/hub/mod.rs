//! Server hub: live peers, rooms, lifecycle hooks, and broadcast.
//!
//! The [`Hub`] owns every accepted [`Peer`] (keyed by [`PeerId`]) and every
//! [`Room`]. Connections are admitted through the WebSocket layer in
//! [`crate::ws`], which runs one receive loop per peer and funnels
//! disconnects through [`Hub`]'s single cleanup path.

pub mod peer;
pub mod peer_id;
pub mod registry;
pub mod room;

pub use peer::Peer;
pub use peer_id::PeerId;
pub use registry::EventRegistry;
pub use room::Room;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::http::HeaderMap;
use parking_lot::RwLock;
use serde_json::Value;

use crate::config::HubConfig;
use crate::error::BusError;

/// Hook inspecting an upgrade request before a peer exists. Returning
/// `false` rejects the connection with HTTP 403.
pub type PreConnectHook = Arc<dyn Fn(&HeaderMap) -> bool + Send + Sync>;

/// Hook invoked with a peer on connect or disconnect.
pub type PeerHook = Arc<dyn Fn(&Arc<Peer>) + Send + Sync>;

/// Hook receiving non-fatal errors (dropped frames, failed ack writes).
pub type ErrorHook = Arc<dyn Fn(&BusError) + Send + Sync>;

#[derive(Default)]
struct Hooks {
    pre_connect: RwLock<Option<PreConnectHook>>,
    connected: RwLock<Option<PeerHook>>,
    disconnected: RwLock<Option<PeerHook>>,
    error: RwLock<Option<ErrorHook>>,
}

/// Owns the set of live peers and rooms; accepts connections and routes
/// frames to per-peer event handlers.
pub struct Hub {
    config: HubConfig,
    peers: RwLock<HashMap<PeerId, Arc<Peer>>>,
    rooms: RwLock<Vec<Arc<Room>>>,
    hooks: Hooks,
}

impl Hub {
    /// Creates a hub with the given configuration.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            peers: RwLock::new(HashMap::new()),
            rooms: RwLock::new(Vec::new()),
            hooks: Hooks::default(),
        }
    }

    /// Returns the hub configuration.
    #[must_use]
    pub const fn config(&self) -> &HubConfig {
        &self.config
    }

    // ─── Lifecycle hooks ───

    /// Registers a hook that inspects the upgrade request headers before a
    /// peer is constructed; returning `false` rejects the connection.
    /// Replaces any previous hook.
    pub fn on_pre_connect(&self, hook: impl Fn(&HeaderMap) -> bool + Send + Sync + 'static) {
        *self.hooks.pre_connect.write() = Some(Arc::new(hook));
    }

    /// Registers the connected hook, invoked after the peer has been added
    /// to the live set and its handshake frame queued. Replaces any
    /// previous hook.
    pub fn on_connected(&self, hook: impl Fn(&Arc<Peer>) + Send + Sync + 'static) {
        *self.hooks.connected.write() = Some(Arc::new(hook));
    }

    /// Registers the disconnected hook, invoked exactly once per peer
    /// after it has been removed from the live set and every room.
    /// Replaces any previous hook.
    pub fn on_disconnected(&self, hook: impl Fn(&Arc<Peer>) + Send + Sync + 'static) {
        *self.hooks.disconnected.write() = Some(Arc::new(hook));
    }

    /// Registers the error hook for non-fatal errors (malformed frames,
    /// failed ack writes). Replaces any previous hook.
    pub fn on_error(&self, hook: impl Fn(&BusError) + Send + Sync + 'static) {
        *self.hooks.error.write() = Some(Arc::new(hook));
    }

    pub(crate) fn allow_connection(&self, headers: &HeaderMap) -> bool {
        let hook = self.hooks.pre_connect.read().clone();
        hook.is_none_or(|hook| hook(headers))
    }

    pub(crate) fn notify_connected(&self, peer: &Arc<Peer>) {
        let hook = self.hooks.connected.read().clone();
        if let Some(hook) = hook {
            hook(peer);
        }
    }

    pub(crate) fn notify_error(&self, err: &BusError) {
        tracing::warn!(error = %err, "frame dropped");
        let hook = self.hooks.error.read().clone();
        if let Some(hook) = hook {
            hook(err);
        }
    }

    // ─── Peer lifecycle ───

    /// Adds a freshly accepted peer to the live set.
    pub(crate) fn insert_peer(&self, peer: &Arc<Peer>) {
        self.peers.write().insert(peer.id(), Arc::clone(peer));
    }

    /// Removes a peer from the live set and every room, then fires the
    /// disconnected hook. Safe to call more than once: only the call that
    /// actually removes the peer runs the cleanup. This is the only
    /// removal path.
    pub(crate) fn remove_peer(&self, peer: &Arc<Peer>) -> bool {
        if self.peers.write().remove(&peer.id()).is_none() {
            return false;
        }
        peer.mark_closed();

        let rooms: Vec<Arc<Room>> = self.rooms.read().clone();
        for room in &rooms {
            room.evict(peer);
        }

        let hook = self.hooks.disconnected.read().clone();
        if let Some(hook) = hook {
            hook(peer);
        }
        true
    }

    /// Returns the peer with the given identity, if still live.
    #[must_use]
    pub fn get_peer(&self, id: PeerId) -> Option<Arc<Peer>> {
        self.peers.read().get(&id).cloned()
    }

    /// Returns a snapshot of all live peers.
    #[must_use]
    pub fn peers(&self) -> Vec<Arc<Peer>> {
        self.peers.read().values().cloned().collect()
    }

    /// Returns the number of live peers.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    // ─── Broadcast ───

    /// Emits `{event, data}` to every live peer, returning the number of
    /// peers the frame was queued for.
    pub fn emit(&self, event: &str, data: &Value) -> usize {
        let snapshot = self.peers();
        snapshot
            .iter()
            .filter(|peer| peer.emit(event, data.clone()).is_ok())
            .count()
    }

    /// Like [`Hub::emit`], but skips one peer (pointer identity).
    pub fn emit_except(&self, except: &Arc<Peer>, event: &str, data: &Value) -> usize {
        let snapshot = self.peers();
        snapshot
            .iter()
            .filter(|peer| !Arc::ptr_eq(peer, except))
            .filter(|peer| peer.emit(event, data.clone()).is_ok())
            .count()
    }

    // ─── Rooms ───

    /// Creates a new empty room.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::RoomExists`] when a room with the same name is
    /// already registered.
    pub fn create_room(&self, name: &str) -> Result<Arc<Room>, BusError> {
        let mut rooms = self.rooms.write();
        if rooms.iter().any(|room| room.name() == name) {
            return Err(BusError::RoomExists(name.to_string()));
        }
        let room = Arc::new(Room::new(name));
        rooms.push(Arc::clone(&room));
        Ok(room)
    }

    /// Returns the room with the given name, if any.
    #[must_use]
    pub fn get_room(&self, name: &str) -> Option<Arc<Room>> {
        self.rooms
            .read()
            .iter()
            .find(|room| room.name() == name)
            .cloned()
    }

    /// Removes a room by identity. Current members are not evicted or
    /// notified; they simply stop receiving room broadcasts through the
    /// hub.
    pub fn delete_room(&self, room: &Arc<Room>) {
        self.rooms.write().retain(|r| !Arc::ptr_eq(r, room));
    }

    /// Returns the number of registered rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("peers", &self.peer_count())
            .field("rooms", &self.room_count())
            .finish_non_exhaustive()
    }
}
