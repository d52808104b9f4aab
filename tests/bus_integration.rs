//! End-to-end tests over a real listener: raw WebSocket clients against
//! the hub, and the reconnecting `BusClient` against a live server.

#![allow(clippy::panic, clippy::indexing_slicing)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use sockethub::client::BusClient;
use sockethub::config::ClientConfig;
use sockethub::hub::{Hub, PeerId};
use sockethub::protocol::{Frame, HANDSHAKE_EVENT};
use sockethub::ws::ws_handler;

const WAIT: Duration = Duration::from_secs(3);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn serve_hub(hub: Arc<Hub>) -> (SocketAddr, JoinHandle<()>) {
    let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
        panic!("failed to bind test listener");
    };
    serve_hub_on(hub, listener)
}

fn serve_hub_on(hub: Arc<Hub>, listener: TcpListener) -> (SocketAddr, JoinHandle<()>) {
    let Ok(addr) = listener.local_addr() else {
        panic!("listener has no local addr");
    };
    let app = Router::new().route("/ws", get(ws_handler)).with_state(hub);
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, handle)
}

async fn connect_raw(addr: SocketAddr) -> WsStream {
    let Ok(Ok((stream, _))) = timeout(WAIT, connect_async(format!("ws://{addr}/ws"))).await else {
        panic!("failed to connect to test server");
    };
    stream
}

async fn recv_frame(ws: &mut WsStream) -> Frame {
    loop {
        let Ok(Some(Ok(msg))) = timeout(WAIT, ws.next()).await else {
            panic!("expected a frame before the timeout");
        };
        if let Message::Text(text) = msg {
            let Ok(frame) = Frame::decode(text.as_str()) else {
                panic!("received message is not a valid frame");
            };
            return frame;
        }
    }
}

async fn send_frame(ws: &mut WsStream, frame: &Frame) {
    let Ok(text) = frame.encode() else {
        panic!("frame encoding failed");
    };
    if ws.send(Message::text(text)).await.is_err() {
        panic!("failed to send frame");
    }
}

/// Completes the handshake and returns the assigned identity.
async fn expect_handshake(ws: &mut WsStream) -> String {
    let frame = recv_frame(ws).await;
    assert_eq!(frame.event, HANDSHAKE_EVENT);
    let Some(id) = frame.data.get("clientId").and_then(Value::as_str) else {
        panic!("handshake frame has no clientId");
    };
    id.to_string()
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    let waited = timeout(WAIT, async {
        while !cond() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if waited.is_err() {
        panic!("condition not reached before the timeout");
    }
}

fn peer_id_from(handshake_id: &str) -> PeerId {
    let Ok(uuid) = handshake_id.parse::<uuid::Uuid>() else {
        panic!("handshake id is not a uuid");
    };
    PeerId::from_uuid(uuid)
}

#[tokio::test]
async fn handshake_is_the_first_frame() {
    let hub = Arc::new(Hub::default());
    let (addr, server) = serve_hub(Arc::clone(&hub)).await;

    let mut ws = connect_raw(addr).await;
    let id = expect_handshake(&mut ws).await;
    assert!(!id.is_empty());
    wait_until(|| hub.peer_count() == 1).await;

    server.abort();
}

#[tokio::test]
async fn ack_round_trip_returns_handler_result() {
    let hub = Arc::new(Hub::default());
    hub.on_connected(|peer| {
        peer.on("sum", |_, data| async move {
            let a = data["a"].as_i64().unwrap_or(0);
            let b = data["b"].as_i64().unwrap_or(0);
            Value::from(a + b)
        });
    });
    let (addr, server) = serve_hub(Arc::clone(&hub)).await;

    let mut ws = connect_raw(addr).await;
    expect_handshake(&mut ws).await;

    send_frame(&mut ws, &Frame::with_ack("sum", json!({"a": 2, "b": 3}), "abc")).await;
    let reply = recv_frame(&mut ws).await;
    assert_eq!(reply.event, "sum@ack:abc");
    assert_eq!(reply.data["result"], 5);

    // Without an ackId no reply frame is produced.
    send_frame(&mut ws, &Frame::new("sum", json!({"a": 1, "b": 1}))).await;
    let silent = timeout(Duration::from_millis(300), ws.next()).await;
    assert!(silent.is_err());

    server.abort();
}

#[tokio::test]
async fn malformed_frames_are_dropped_without_killing_the_connection() {
    let hub = Arc::new(Hub::default());
    hub.on_connected(|peer| {
        peer.on("ping", |_, _| async { Value::from("pong") });
    });
    let (addr, server) = serve_hub(Arc::clone(&hub)).await;

    let mut ws = connect_raw(addr).await;
    expect_handshake(&mut ws).await;

    for bad in ["{not json", r#"{"data":{}}"#, r#"{"event":"x","data":[1]}"#] {
        if ws.send(Message::text(bad.to_string())).await.is_err() {
            panic!("failed to send malformed frame");
        }
    }

    // The connection survives and still dispatches.
    send_frame(&mut ws, &Frame::with_ack("ping", json!({}), "1")).await;
    let reply = recv_frame(&mut ws).await;
    assert_eq!(reply.event, "ping@ack:1");
    assert_eq!(reply.data["result"], "pong");

    server.abort();
}

#[tokio::test]
async fn room_broadcast_skips_departed_member() {
    let hub = Arc::new(Hub::default());
    let Ok(lobby) = hub.create_room("lobby") else {
        panic!("room creation failed");
    };
    let hub_for_hook = Arc::clone(&hub);
    hub.on_connected(move |peer| {
        if let Some(lobby) = hub_for_hook.get_room("lobby") {
            lobby.join(peer);
        }
    });
    let (addr, server) = serve_hub(Arc::clone(&hub)).await;

    let mut ws_a = connect_raw(addr).await;
    let id_a = expect_handshake(&mut ws_a).await;
    let mut ws_b = connect_raw(addr).await;
    expect_handshake(&mut ws_b).await;
    wait_until(|| lobby.len() == 2).await;

    // A leaves the lobby; the broadcast reaches B only.
    let Some(peer_a) = hub.get_peer(peer_id_from(&id_a)) else {
        panic!("peer A not found in hub");
    };
    lobby.leave(&peer_a);

    let delivered = lobby.emit("ping", &json!({}));
    assert_eq!(delivered, 1);
    let frame = recv_frame(&mut ws_b).await;
    assert_eq!(frame.event, "ping");
    let silent = timeout(Duration::from_millis(300), ws_a.next()).await;
    assert!(silent.is_err());

    server.abort();
}

#[tokio::test]
async fn disconnect_removes_peer_from_hub_and_rooms() {
    let hub = Arc::new(Hub::default());
    let Ok(lobby) = hub.create_room("lobby") else {
        panic!("room creation failed");
    };
    let hub_for_hook = Arc::clone(&hub);
    hub.on_connected(move |peer| {
        if let Some(lobby) = hub_for_hook.get_room("lobby") {
            lobby.join(peer);
        }
    });
    let (addr, server) = serve_hub(Arc::clone(&hub)).await;

    let mut ws = connect_raw(addr).await;
    expect_handshake(&mut ws).await;
    wait_until(|| hub.peer_count() == 1 && lobby.len() == 1).await;

    let _ = ws.close(None).await;
    wait_until(|| hub.peer_count() == 0).await;
    assert!(lobby.is_empty());
    assert_eq!(hub.emit("ping", &json!({})), 0);

    server.abort();
}

#[tokio::test]
async fn bus_client_resolves_acknowledgements() {
    let hub = Arc::new(Hub::default());
    hub.on_connected(|peer| {
        peer.on("sum", |_, data| async move {
            let a = data["a"].as_i64().unwrap_or(0);
            let b = data["b"].as_i64().unwrap_or(0);
            Value::from(a + b)
        });
    });
    let (addr, server) = serve_hub(Arc::clone(&hub)).await;

    let client = BusClient::new(
        ClientConfig::new(format!("ws://{addr}/ws"))
            .with_reconnect_delay(Duration::from_millis(100)),
    );
    client.connect();
    wait_until(|| client.is_connected()).await;

    let Ok(result) = client.emit_with_ack("sum", json!({"a": 2, "b": 3})).await else {
        panic!("ack future rejected");
    };
    assert_eq!(result, json!(5));

    client.close();
    server.abort();
}

#[tokio::test]
async fn bus_client_reconnects_after_server_side_close() {
    let hub = Arc::new(Hub::default());
    let (addr, server) = serve_hub(Arc::clone(&hub)).await;

    let client = BusClient::new(
        ClientConfig::new(format!("ws://{addr}/ws"))
            .with_reconnect_delay(Duration::from_millis(100)),
    );
    let (connected_tx, mut connected_rx) = tokio::sync::mpsc::unbounded_channel();
    client.on_connected(move |id| {
        let _ = connected_tx.send(id.to_string());
    });
    let (dropped_tx, mut dropped_rx) = tokio::sync::mpsc::unbounded_channel();
    client.on_disconnected(move || {
        let _ = dropped_tx.send(());
    });
    client.connect();

    let Ok(Some(first_id)) = timeout(WAIT, connected_rx.recv()).await else {
        panic!("client never connected");
    };

    // Kick the peer from the server side; the client must come back on
    // its own with a fresh identity.
    wait_until(|| hub.peer_count() == 1).await;
    for peer in hub.peers() {
        peer.close();
    }
    let Ok(Some(())) = timeout(WAIT, dropped_rx.recv()).await else {
        panic!("disconnected hook never fired");
    };

    let Ok(Some(second_id)) = timeout(WAIT, connected_rx.recv()).await else {
        panic!("client never reconnected");
    };
    assert_ne!(first_id, second_id);
    assert!(client.is_connected());

    client.close();
    server.abort();
}

#[tokio::test]
async fn bus_client_connects_once_endpoint_appears() {
    // Reserve a port, drop the listener, and let the client retry into
    // the void until the server shows up.
    let Ok(probe) = TcpListener::bind("127.0.0.1:0").await else {
        panic!("failed to bind probe listener");
    };
    let Ok(addr) = probe.local_addr() else {
        panic!("probe listener has no local addr");
    };
    drop(probe);

    let client = BusClient::new(
        ClientConfig::new(format!("ws://{addr}/ws"))
            .with_reconnect_delay(Duration::from_millis(100)),
    );
    client.connect();
    sleep(Duration::from_millis(300)).await;
    assert!(!client.is_connected());
    assert!(client.id().is_none());

    let hub = Arc::new(Hub::default());
    let Ok(listener) = TcpListener::bind(addr).await else {
        panic!("failed to rebind reserved addr");
    };
    let (_, server) = serve_hub_on(Arc::clone(&hub), listener);

    wait_until(|| client.is_connected()).await;
    assert!(client.id().is_some());

    client.close();
    server.abort();
}
