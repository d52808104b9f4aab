//! # sockethub
//!
//! Real-time event bus over bidirectional WebSocket connections: named
//! events with per-peer handlers, request/acknowledgement correlation,
//! room broadcast, and an automatically reconnecting client half.
//!
//! Single-process and in-memory: no persistence, no multi-node fan-out,
//! at-most-once delivery.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket)
//!     │
//!     ├── WS upgrade + per-peer loops (ws/)
//!     │
//!     ├── Hub: live peers, rooms, hooks (hub/)
//!     │     ├── Peer: identity + event registry
//!     │     └── Room: broadcast groups
//!     │
//!     ├── Frame envelope + handshake/ack protocol (protocol)
//!     │
//!     └── BusClient: reconnecting counterpart (client/)
//! ```
//!
//! ## Wire protocol
//!
//! Every message is one JSON frame `{event, data, ackId?}`. The server's
//! first frame on a new connection is `#handshake` with `{clientId}`.
//! A frame carrying `ackId` gets a reply on `{event}@ack:{ackId}` with
//! `{result: <handler return value>}`.

pub mod client;
pub mod config;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod ws;

pub use client::BusClient;
pub use config::{ClientConfig, HubConfig};
pub use error::BusError;
pub use hub::{Hub, Peer, PeerId, Room};
pub use protocol::Frame;
