//! sockethub demo relay server.
//!
//! Boots a hub that answers `echo` with an acknowledgeable payload and
//! keeps every connected peer in a `lobby` room with join/leave
//! announcements.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use sockethub::config::HubConfig;
use sockethub::hub::Hub;
use sockethub::ws::ws_handler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = HubConfig::from_env().map_err(|err| anyhow::anyhow!(err.to_string()))?;
    let listen_addr = config.listen_addr;
    tracing::info!(addr = %listen_addr, "starting sockethub");

    // Build the hub
    let hub = Arc::new(Hub::new(config));
    let lobby = hub
        .create_room("lobby")
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    lobby.on_client_joined(|peer| {
        tracing::info!(peer = %peer.id(), "joined lobby");
    });
    lobby.on_client_left(|peer| {
        tracing::info!(peer = %peer.id(), "left lobby");
    });

    let hub_for_hook = Arc::clone(&hub);
    hub.on_connected(move |peer| {
        peer.on("echo", |_, data| async move { data });

        if let Some(lobby) = hub_for_hook.get_room("lobby") {
            lobby.join(peer);
            lobby.emit_except(
                peer,
                "lobby:joined",
                &serde_json::json!({ "peer": peer.id().to_string() }),
            );
        }
    });
    hub.on_disconnected(|peer| {
        tracing::info!(peer = %peer.id(), "peer gone");
    });

    // Build router
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(hub);

    // Start server
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = %listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
