//! One live server-side connection.
//!
//! A [`Peer`] owns the connection's identity, its event registry, and the
//! write half of the transport (an unbounded channel drained by a dedicated
//! writer task). `emit` is synchronous: it encodes the frame and enqueues
//! it, so it is safe to call from any task and from inside event handlers.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::Message;
use serde_json::Value;
use tokio::sync::mpsc;

use super::registry::{EventHandler, EventRegistry};
use super::PeerId;
use crate::error::BusError;
use crate::protocol::Frame;

/// One connected peer: identity, event bindings, and the outbound write
/// handle.
pub struct Peer {
    id: PeerId,
    writer: mpsc::UnboundedSender<Message>,
    closed: AtomicBool,
    registry: EventRegistry,
}

impl Peer {
    /// Creates a peer with a fresh identity around an outbound channel.
    pub(crate) fn new(writer: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: PeerId::new(),
            writer,
            closed: AtomicBool::new(false),
            registry: EventRegistry::new(),
        }
    }

    /// Returns the server-assigned identity of this peer.
    #[must_use]
    pub const fn id(&self) -> PeerId {
        self.id
    }

    /// Encodes `{event, data}` and enqueues it for the writer task.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Transport`] when the connection is closed or the
    /// writer task has gone away. Failed emits are not retried.
    pub fn emit(&self, event: &str, data: Value) -> Result<(), BusError> {
        self.send_frame(&Frame::new(event, data))
    }

    /// Enqueues an already-built frame.
    pub(crate) fn send_frame(&self, frame: &Frame) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Transport("connection closed".to_string()));
        }
        let text = frame.encode()?;
        self.writer
            .send(Message::text(text))
            .map_err(|_| BusError::Transport("writer task terminated".to_string()))
    }

    /// Binds `handler` to `event`, replacing any previous binding for that
    /// name. The handler runs on the peer's receive-loop task; its return
    /// value is sent back as `{result}` when the frame carried an `ackId`.
    pub fn on<F, Fut>(&self, event: &str, handler: F)
    where
        F: Fn(Arc<Self>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Value> + Send + 'static,
    {
        self.registry.bind(event, box_handler(handler), false);
    }

    /// Like [`Peer::on`], but the binding is removed before the handler
    /// first runs, so it can never fire a second time.
    pub fn once<F, Fut>(&self, event: &str, handler: F)
    where
        F: Fn(Arc<Self>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Value> + Send + 'static,
    {
        self.registry.bind(event, box_handler(handler), true);
    }

    /// Removes any binding for `event`. No-op when absent.
    pub fn off(&self, event: &str) {
        self.registry.unbind(event);
    }

    /// Resolves the handler for an inbound event, honoring one-shot
    /// removal.
    pub(crate) fn resolve_handler(&self, event: &str) -> Option<EventHandler> {
        self.registry.resolve(event)
    }

    /// Requests a transport close. The peer stays in the hub's live set
    /// (and in its rooms) until its receive loop observes the close and
    /// runs the disconnect path.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.writer.send(Message::Close(None));
        }
    }

    /// Marks the peer closed without queueing a close frame. Used by the
    /// disconnect path once the transport is already gone.
    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Returns `true` once the peer has been closed locally or reaped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

fn box_handler<F, Fut>(handler: F) -> EventHandler
where
    F: Fn(Arc<Peer>, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Value> + Send + 'static,
{
    Arc::new(move |peer, data| Box::pin(handler(peer, data)))
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
pub(crate) mod tests {
    use super::*;

    /// Builds a peer plus the receiving end of its outbound channel.
    pub(crate) fn channel_peer() -> (Arc<Peer>, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Peer::new(tx)), rx)
    }

    /// Pops the next queued outbound frame, panicking when none is queued.
    pub(crate) fn next_frame(rx: &mut mpsc::UnboundedReceiver<Message>) -> Frame {
        let Ok(msg) = rx.try_recv() else {
            panic!("expected a queued outbound message");
        };
        let Message::Text(text) = msg else {
            panic!("expected a text message");
        };
        let Ok(frame) = Frame::decode(text.as_str()) else {
            panic!("outbound message is not a valid frame");
        };
        frame
    }

    #[test]
    fn emit_enqueues_encoded_frame() {
        let (peer, mut rx) = channel_peer();
        let result = peer.emit("chat", serde_json::json!({"text": "hi"}));
        assert!(result.is_ok());

        let frame = next_frame(&mut rx);
        assert_eq!(frame.event, "chat");
        assert_eq!(frame.data["text"], "hi");
    }

    #[test]
    fn emit_after_close_is_transport_error() {
        let (peer, mut rx) = channel_peer();
        peer.close();
        let result = peer.emit("chat", serde_json::json!({}));
        assert!(matches!(result, Err(BusError::Transport(_))));

        // Only the close frame was queued.
        let Ok(Message::Close(_)) = rx.try_recv() else {
            panic!("expected a close frame");
        };
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn emit_after_writer_drop_is_transport_error() {
        let (peer, rx) = channel_peer();
        drop(rx);
        let result = peer.emit("chat", serde_json::json!({}));
        assert!(matches!(result, Err(BusError::Transport(_))));
    }

    #[test]
    fn close_is_idempotent() {
        let (peer, mut rx) = channel_peer();
        peer.close();
        peer.close();
        assert!(peer.is_closed());

        let Ok(Message::Close(_)) = rx.try_recv() else {
            panic!("expected a close frame");
        };
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn on_replaces_and_off_removes() {
        let (peer, _rx) = channel_peer();
        peer.on("chat", |_, _| async { Value::Null });
        peer.on("chat", |_, _| async { Value::from(2) });
        assert!(peer.resolve_handler("chat").is_some());

        peer.off("chat");
        assert!(peer.resolve_handler("chat").is_none());
    }
}
