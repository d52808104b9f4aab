//! Named broadcast groups.
//!
//! A [`Room`] holds references to member peers (membership, not
//! ownership). Broadcast snapshots the member list before iterating, so a
//! handler reacting to a delivery may join or leave rooms without
//! deadlocking the broadcast.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use super::Peer;

/// Callback invoked when a peer joins or leaves a room.
pub type RoomHook = Arc<dyn Fn(&Arc<Peer>) + Send + Sync>;

/// Named group of peers with join/leave lifecycle callbacks and group
/// emit.
pub struct Room {
    name: String,
    members: RwLock<Vec<Arc<Peer>>>,
    joined: RwLock<Option<RoomHook>>,
    left: RwLock<Option<RoomHook>>,
}

impl Room {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: RwLock::new(Vec::new()),
            joined: RwLock::new(None),
            left: RwLock::new(None),
        }
    }

    /// Returns the room's name, unique within its hub.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds `peer` to the room and fires the on-joined callback.
    ///
    /// Joining a room the peer is already in is a no-op (no duplicate
    /// membership, no callback).
    pub fn join(&self, peer: &Arc<Peer>) {
        {
            let mut members = self.members.write();
            if members.iter().any(|m| Arc::ptr_eq(m, peer)) {
                return;
            }
            members.push(Arc::clone(peer));
        }
        let hook = self.joined.read().clone();
        if let Some(hook) = hook {
            hook(peer);
        }
    }

    /// Removes the first membership entry matching `peer` (pointer
    /// identity) and fires the on-left callback. Removing a non-member is
    /// a silent no-op: no callback fires.
    pub fn leave(&self, peer: &Arc<Peer>) {
        let removed = {
            let mut members = self.members.write();
            match members.iter().position(|m| Arc::ptr_eq(m, peer)) {
                Some(idx) => {
                    members.remove(idx);
                    true
                }
                None => false,
            }
        };
        if !removed {
            return;
        }
        let hook = self.left.read().clone();
        if let Some(hook) = hook {
            hook(peer);
        }
    }

    /// Returns `true` if `peer` is currently a member.
    #[must_use]
    pub fn contains(&self, peer: &Arc<Peer>) -> bool {
        self.members.read().iter().any(|m| Arc::ptr_eq(m, peer))
    }

    /// Returns the current number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    /// Returns `true` if the room has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    /// Broadcasts `{event, data}` to every current member, returning the
    /// number of peers the frame was queued for. Peers whose transport is
    /// already closed are skipped.
    pub fn emit(&self, event: &str, data: &Value) -> usize {
        self.emit_filtered(event, data, None)
    }

    /// Like [`Room::emit`], but skips one member (pointer identity). Used
    /// for the "broadcast to everyone else" pattern.
    pub fn emit_except(&self, except: &Arc<Peer>, event: &str, data: &Value) -> usize {
        self.emit_filtered(event, data, Some(except))
    }

    fn emit_filtered(&self, event: &str, data: &Value, except: Option<&Arc<Peer>>) -> usize {
        // Snapshot so handlers reacting to the delivery can mutate
        // membership without deadlocking against this broadcast.
        let snapshot: Vec<Arc<Peer>> = self.members.read().clone();
        let mut delivered = 0;
        for member in &snapshot {
            if let Some(skip) = except
                && Arc::ptr_eq(member, skip)
            {
                continue;
            }
            if member.emit(event, data.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Registers the on-joined callback, replacing any previous one.
    pub fn on_client_joined(&self, hook: impl Fn(&Arc<Peer>) + Send + Sync + 'static) {
        *self.joined.write() = Some(Arc::new(hook));
    }

    /// Registers the on-left callback, replacing any previous one.
    pub fn on_client_left(&self, hook: impl Fn(&Arc<Peer>) + Send + Sync + 'static) {
        *self.left.write() = Some(Arc::new(hook));
    }

    /// Removes `peer` on disconnect, firing the on-left callback when it
    /// was a member.
    pub(crate) fn evict(&self, peer: &Arc<Peer>) {
        self.leave(peer);
    }
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("name", &self.name)
            .field("members", &self.len())
            .finish_non_exhaustive()
    }
}
