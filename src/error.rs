//! Bus error taxonomy.
//!
//! [`BusError`] is the central error type for the hub and the client bus.
//! Transport failures are fatal to a connection; protocol and handshake
//! failures are reported and the offending frame is dropped.

/// Error type shared by the server hub and the client bus.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The underlying WebSocket read or write failed, or the connection
    /// is already closed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The client bus has no open transport; emits fail immediately
    /// instead of being queued.
    #[error("not connected")]
    NotConnected,

    /// A frame could not be decoded: malformed JSON, a missing required
    /// field, or a field of the wrong shape. The frame is dropped and the
    /// connection stays up.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Handshake violation, e.g. a second `#handshake` while an identity
    /// is already held. Logged, never fatal.
    #[error("handshake error: {0}")]
    Handshake(String),

    /// No acknowledgement arrived for an emitted event within the
    /// configured window.
    #[error("no acknowledgement for '{event}' within {waited_ms} ms")]
    AckTimeout {
        /// Event name the acknowledgement was expected for.
        event: String,
        /// Milliseconds waited before giving up.
        waited_ms: u64,
    },

    /// A room with the given name already exists on the hub.
    #[error("room '{0}' already exists")]
    RoomExists(String),
}

impl BusError {
    /// Returns `true` for errors that terminate the owning connection
    /// (transport-level failures). All other variants are drop-and-report.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
