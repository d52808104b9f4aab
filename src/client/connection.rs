//! Client transport run loop: connect, handshake, dispatch, reconnect.
//!
//! The loop is unconditional and infinite: any transport close clears the
//! identity, fires the disconnected hook, sleeps the configured fixed
//! delay, and connects again. There is no backoff growth and no retry cap.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async_with_config;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

use super::ClientShared;
use crate::error::BusError;
use crate::protocol::{Frame, HANDSHAKE_EVENT};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Runs the connect/drive/reconnect cycle until shutdown.
pub(crate) async fn run_loop(shared: Arc<ClientShared>) {
    loop {
        if shared.is_shutdown() {
            break;
        }

        let ws_config = WebSocketConfig::default()
            .read_buffer_size(shared.config.read_buffer_size)
            .write_buffer_size(shared.config.write_buffer_size);
        match connect_async_with_config(shared.config.url.as_str(), Some(ws_config), false).await {
            Ok((stream, _response)) => {
                tracing::debug!(url = %shared.config.url, "transport open");
                let (out_tx, out_rx) = mpsc::unbounded_channel();
                shared.set_writer(out_tx);
                shared.notify_pre_connected();

                drive(&shared, stream, out_rx).await;

                shared.clear_connection();
                shared.notify_disconnected();
                tracing::debug!(url = %shared.config.url, "transport closed");
            }
            Err(err) => {
                tracing::warn!(url = %shared.config.url, error = %err, "connect failed");
            }
        }

        if shared.is_shutdown() {
            break;
        }
        tokio::time::sleep(shared.config.reconnect_delay).await;
    }
}

/// Pumps one open transport: forwards queued emits to the sink and
/// dispatches inbound frames, until either direction fails or closes.
async fn drive(
    shared: &Arc<ClientShared>,
    stream: WsStream,
    mut out_rx: mpsc::UnboundedReceiver<Message>,
) {
    let (mut ws_tx, mut ws_rx) = stream.split();

    loop {
        tokio::select! {
            outbound = out_rx.recv() => match outbound {
                Some(msg) => {
                    let is_close = matches!(msg, Message::Close(_));
                    if ws_tx.send(msg).await.is_err() || is_close {
                        break;
                    }
                }
                None => break,
            },
            inbound = ws_rx.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    handle_inbound(shared, Frame::decode(text.as_str()));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    handle_inbound(shared, Frame::decode_bytes(&bytes));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!(error = %err, "transport read failed");
                    break;
                }
            }
        }
    }
}

/// Routes one inbound frame: handshake frames drive the identity state
/// machine, everything else fans out to the bound listeners. Malformed
/// frames and frames arriving before the handshake are logged and dropped.
pub(crate) fn handle_inbound(shared: &ClientShared, decoded: Result<Frame, BusError>) {
    let frame = match decoded {
        Ok(frame) => frame,
        Err(err) => {
            tracing::warn!(error = %err, "frame dropped");
            return;
        }
    };

    if frame.event == HANDSHAKE_EVENT {
        handle_handshake(shared, &frame);
        return;
    }

    if shared.id().is_none() {
        tracing::warn!(event = %frame.event, "frame before handshake dropped");
        return;
    }

    for listener in shared.listeners.drain_matching(&frame.event) {
        listener(frame.data.clone());
    }
}

fn handle_handshake(shared: &ClientShared, frame: &Frame) {
    if shared.id().is_some() {
        let err = BusError::Handshake("handshake received while already identified".to_string());
        tracing::warn!(error = %err, "frame dropped");
        return;
    }
    let Some(client_id) = frame.data.get("clientId").and_then(Value::as_str) else {
        let err = BusError::Protocol("handshake missing 'clientId'".to_string());
        tracing::warn!(error = %err, "frame dropped");
        return;
    };
    shared.set_id(client_id);
    tracing::debug!(id = %client_id, "handshake complete");
    shared.notify_connected(client_id);
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::config::ClientConfig;

    fn make_shared() -> Arc<ClientShared> {
        Arc::new(ClientShared::new(ClientConfig::new("ws://unused/ws")))
    }

    fn handshake_frame(id: &str) -> Frame {
        Frame::new(HANDSHAKE_EVENT, json!({ "clientId": id }))
    }

    #[test]
    fn handshake_assigns_identity_and_fires_hook() {
        let shared = make_shared();
        let connected = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&connected);
        shared.set_connected_hook(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handle_inbound(&shared, Ok(handshake_frame("abc-123")));
        assert_eq!(shared.id().as_deref(), Some("abc-123"));
        assert_eq!(connected.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn double_handshake_is_logged_not_fatal() {
        let shared = make_shared();
        handle_inbound(&shared, Ok(handshake_frame("first")));
        handle_inbound(&shared, Ok(handshake_frame("second")));
        // Identity is unchanged; the duplicate is dropped.
        assert_eq!(shared.id().as_deref(), Some("first"));
    }

    #[test]
    fn handshake_without_client_id_is_dropped() {
        let shared = make_shared();
        handle_inbound(&shared, Ok(Frame::new(HANDSHAKE_EVENT, json!({}))));
        assert!(shared.id().is_none());
    }

    #[test]
    fn frames_before_handshake_are_dropped() {
        let shared = make_shared();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        shared
            .listeners
            .bind("chat", Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }), false);

        handle_inbound(&shared, Ok(Frame::new("chat", json!({}))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        handle_inbound(&shared, Ok(handshake_frame("id")));
        handle_inbound(&shared, Ok(Frame::new("chat", json!({}))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn every_bound_listener_fires() {
        let shared = make_shared();
        handle_inbound(&shared, Ok(handshake_frame("id")));

        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let counter = Arc::clone(&calls);
            shared.listeners.bind("chat", Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }), false);
        }

        handle_inbound(&shared, Ok(Frame::new("chat", json!({}))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn malformed_frame_is_dropped() {
        let shared = make_shared();
        handle_inbound(&shared, Frame::decode("{not json"));
        assert!(shared.id().is_none());
    }
}
