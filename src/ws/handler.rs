//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use super::connection::run_connection;
use crate::hub::Hub;

/// `GET /ws` — upgrade the HTTP connection and hand it to the hub.
///
/// The hub's pre-connect hook sees the request headers before the upgrade
/// and may reject the connection with `403 Forbidden`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<Hub>>,
    headers: HeaderMap,
) -> Response {
    if !hub.allow_connection(&headers) {
        return StatusCode::FORBIDDEN.into_response();
    }

    let read_buffer_size = hub.config().read_buffer_size;
    let write_buffer_size = hub.config().write_buffer_size;
    ws.read_buffer_size(read_buffer_size)
        .write_buffer_size(write_buffer_size)
        .on_upgrade(move |socket| run_connection(hub, socket))
        .into_response()
}
