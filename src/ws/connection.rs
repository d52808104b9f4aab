//! Per-peer receive loop and writer task.
//!
//! Each accepted connection gets one receive loop (this module) and one
//! writer task draining the peer's outbound channel. Handler invocation is
//! awaited inline, so frames on one connection are processed strictly in
//! order; frames on different connections interleave freely.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::hub::{Hub, Peer};
use crate::protocol::Frame;

/// Admits an upgraded socket and runs its receive loop to completion.
///
/// Protocol order: the peer joins the live set, its `#handshake` frame is
/// queued (guaranteed first on the wire), the connected hook runs, then
/// frames are read until the transport closes or errors. Decode failures
/// are reported and dropped; only transport-level failures end the loop.
pub(crate) async fn run_connection(hub: Arc<Hub>, socket: WebSocket) {
    let (ws_tx, mut ws_rx) = socket.split();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let peer = Arc::new(Peer::new(out_tx));

    hub.insert_peer(&peer);
    if peer.send_frame(&Frame::handshake(peer.id())).is_err() {
        hub.remove_peer(&peer);
        return;
    }
    tracing::debug!(peer = %peer.id(), "peer connected");
    hub.notify_connected(&peer);

    let writer = tokio::spawn(write_loop(ws_tx, out_rx));

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => match Frame::decode(text.as_str()) {
                Ok(frame) => dispatch_frame(&hub, &peer, frame).await,
                Err(err) => hub.notify_error(&err),
            },
            Ok(Message::Binary(bytes)) => match Frame::decode_bytes(&bytes) {
                Ok(frame) => dispatch_frame(&hub, &peer, frame).await,
                Err(err) => hub.notify_error(&err),
            },
            Ok(Message::Close(_)) => break,
            // Ping/pong are answered by axum itself.
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(peer = %peer.id(), error = %err, "transport read failed");
                break;
            }
        }
    }

    hub.remove_peer(&peer);
    writer.abort();
    tracing::debug!(peer = %peer.id(), "peer disconnected");
}

/// Routes one decoded frame into the peer's registry and synthesizes the
/// acknowledgement reply when the frame carried a non-empty `ackId`. The
/// reply is queued before the next frame is read, preserving per-connection
/// request/response ordering. Unbound events are dropped silently.
pub(crate) async fn dispatch_frame(hub: &Hub, peer: &Arc<Peer>, frame: Frame) {
    let Some(handler) = peer.resolve_handler(&frame.event) else {
        return;
    };
    let result = handler(Arc::clone(peer), frame.data).await;

    if let Some(ack_id) = frame.ack_id.as_deref().filter(|id| !id.is_empty()) {
        let reply = Frame::ack_reply(&frame.event, ack_id, result);
        if let Err(err) = peer.send_frame(&reply) {
            hub.notify_error(&err);
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = out_rx.recv().await {
        let is_close = matches!(msg, Message::Close(_));
        if sink.send(msg).await.is_err() || is_close {
            break;
        }
    }
}
