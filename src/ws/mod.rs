//! Server-side WebSocket transport: upgrade endpoint and per-peer loops.
//!
//! [`handler::ws_handler`] admits connections (running the hub's
//! pre-connect check before upgrading); [`connection`] runs one receive
//! loop and one writer task per peer.

pub mod connection;
pub mod handler;

pub use handler::ws_handler;
