//! Hub and client configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`), with documented defaults.

use std::net::SocketAddr;
use std::time::Duration;

/// Default read/write buffer size for WebSocket transports, in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Default delay between client reconnection attempts, in milliseconds.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5000;

/// Default acknowledgement timeout, in milliseconds. `0` disables the
/// timeout and waits forever.
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 10_000;

/// Server-side hub configuration.
///
/// Loaded once at startup via [`HubConfig::from_env`].
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// WebSocket read buffer size in bytes.
    pub read_buffer_size: usize,

    /// WebSocket write buffer size in bytes.
    pub write_buffer_size: usize,
}

impl HubConfig {
    /// Loads hub configuration from environment variables.
    ///
    /// Recognized keys: `SOCKETHUB_LISTEN_ADDR`,
    /// `SOCKETHUB_READ_BUFFER_SIZE`, `SOCKETHUB_WRITE_BUFFER_SIZE`.
    /// Falls back to defaults when a variable is not set. Calls
    /// `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `SOCKETHUB_LISTEN_ADDR` is set but cannot be
    /// parsed as a [`SocketAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("SOCKETHUB_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()?;

        Ok(Self {
            listen_addr,
            read_buffer_size: parse_env("SOCKETHUB_READ_BUFFER_SIZE", DEFAULT_BUFFER_SIZE),
            write_buffer_size: parse_env("SOCKETHUB_WRITE_BUFFER_SIZE", DEFAULT_BUFFER_SIZE),
        })
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            read_buffer_size: DEFAULT_BUFFER_SIZE,
            write_buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Client-side bus configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint to connect to (e.g. `ws://localhost:3000/ws`).
    pub url: String,

    /// Fixed delay between reconnection attempts.
    pub reconnect_delay: Duration,

    /// How long [`crate::client::BusClient::emit_with_ack`] waits for the
    /// acknowledgement reply. `None` waits forever.
    pub ack_timeout: Option<Duration>,

    /// WebSocket read buffer size in bytes.
    pub read_buffer_size: usize,

    /// WebSocket write buffer size in bytes.
    pub write_buffer_size: usize,
}

impl ClientConfig {
    /// Creates a configuration for the given endpoint with default
    /// reconnect delay, ack timeout, and buffer sizes.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            ack_timeout: Some(Duration::from_millis(DEFAULT_ACK_TIMEOUT_MS)),
            read_buffer_size: DEFAULT_BUFFER_SIZE,
            write_buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Replaces the reconnection delay.
    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Replaces the acknowledgement timeout. `None` waits forever.
    #[must_use]
    pub const fn with_ack_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Loads client configuration from environment variables.
    ///
    /// Recognized keys: `SOCKETHUB_URL`, `SOCKETHUB_RECONNECT_DELAY_MS`,
    /// `SOCKETHUB_ACK_TIMEOUT_MS` (`0` disables the timeout),
    /// `SOCKETHUB_READ_BUFFER_SIZE`, `SOCKETHUB_WRITE_BUFFER_SIZE`.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let url = std::env::var("SOCKETHUB_URL")
            .unwrap_or_else(|_| "ws://localhost:3000/ws".to_string());
        let reconnect_ms = parse_env("SOCKETHUB_RECONNECT_DELAY_MS", DEFAULT_RECONNECT_DELAY_MS);
        let ack_timeout_ms = parse_env("SOCKETHUB_ACK_TIMEOUT_MS", DEFAULT_ACK_TIMEOUT_MS);

        Self {
            url,
            reconnect_delay: Duration::from_millis(reconnect_ms),
            ack_timeout: (ack_timeout_ms > 0).then(|| Duration::from_millis(ack_timeout_ms)),
            read_buffer_size: parse_env("SOCKETHUB_READ_BUFFER_SIZE", DEFAULT_BUFFER_SIZE),
            write_buffer_size: parse_env("SOCKETHUB_WRITE_BUFFER_SIZE", DEFAULT_BUFFER_SIZE),
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn hub_defaults_are_applied() {
        let config = HubConfig::default();
        assert_eq!(config.read_buffer_size, 1024);
        assert_eq!(config.write_buffer_size, 1024);
    }

    #[test]
    fn client_defaults() {
        let config = ClientConfig::new("ws://localhost:3000/ws");
        assert_eq!(config.reconnect_delay, Duration::from_millis(5000));
        assert_eq!(config.ack_timeout, Some(Duration::from_millis(10_000)));
        assert_eq!(config.read_buffer_size, 1024);
    }

    #[test]
    fn builder_overrides() {
        let config = ClientConfig::new("ws://x/ws")
            .with_reconnect_delay(Duration::from_millis(100))
            .with_ack_timeout(None);
        assert_eq!(config.reconnect_delay, Duration::from_millis(100));
        assert!(config.ack_timeout.is_none());
    }

    #[test]
    fn parse_env_falls_back_on_missing() {
        assert_eq!(parse_env("SOCKETHUB_TEST_MISSING_KEY", 42_u64), 42);
    }
}
