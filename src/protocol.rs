//! Wire protocol: the frame envelope and reserved event names.
//!
//! Every WebSocket message carries one JSON [`Frame`]:
//!
//! ```json
//! {"event": "chat", "data": {"text": "hi"}, "ackId": "optional"}
//! ```
//!
//! Acknowledgement replies reuse the same shape with the event rewritten to
//! `{event}@ack:{ackId}` and `data` set to `{"result": <handler value>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BusError;
use crate::hub::PeerId;

/// Reserved event carrying the server-assigned identity. Always the first
/// message delivered on a newly accepted connection.
pub const HANDSHAKE_EVENT: &str = "#handshake";

/// Separator between the original event name and the correlation id in an
/// acknowledgement reply's event name.
const ACK_INFIX: &str = "@ack:";

/// Builds the event name of an acknowledgement reply: `{event}@ack:{id}`.
#[must_use]
pub fn ack_event_name(event: &str, ack_id: &str) -> String {
    format!("{event}{ACK_INFIX}{ack_id}")
}

/// One decoded wire frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Event name the frame is addressed to.
    pub event: String,
    /// Event payload; always a JSON object on the wire.
    pub data: Value,
    /// Correlation id chosen by the emitter when it expects an
    /// acknowledgement. Omitted from the wire when absent.
    #[serde(rename = "ackId", skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<String>,
}

impl Frame {
    /// Creates a frame without an acknowledgement id.
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            ack_id: None,
        }
    }

    /// Creates a frame requesting an acknowledgement under `ack_id`.
    #[must_use]
    pub fn with_ack(event: impl Into<String>, data: Value, ack_id: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data,
            ack_id: Some(ack_id.into()),
        }
    }

    /// Creates the handshake frame carrying the server-assigned identity.
    #[must_use]
    pub fn handshake(peer_id: PeerId) -> Self {
        Self::new(
            HANDSHAKE_EVENT,
            serde_json::json!({ "clientId": peer_id.to_string() }),
        )
    }

    /// Creates the acknowledgement reply for `event` under `ack_id`,
    /// wrapping the handler's return value as `{"result": ...}`.
    #[must_use]
    pub fn ack_reply(event: &str, ack_id: &str, result: Value) -> Self {
        Self::new(
            ack_event_name(event, ack_id),
            serde_json::json!({ "result": result }),
        )
    }

    /// Decodes a frame from raw text, validating the required fields.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Protocol`] for malformed JSON, a missing or
    /// non-string `event`, a missing `data`, or a `data` that is not an
    /// object. Decoding never panics on malformed input.
    pub fn decode(raw: &str) -> Result<Self, BusError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| BusError::Protocol(format!("malformed JSON: {err}")))?;
        Self::from_value(value)
    }

    /// Decodes a frame from raw bytes (binary WebSocket messages).
    ///
    /// # Errors
    ///
    /// Same conditions as [`Frame::decode`].
    pub fn decode_bytes(raw: &[u8]) -> Result<Self, BusError> {
        let value: Value = serde_json::from_slice(raw)
            .map_err(|err| BusError::Protocol(format!("malformed JSON: {err}")))?;
        Self::from_value(value)
    }

    fn from_value(mut value: Value) -> Result<Self, BusError> {
        let Some(obj) = value.as_object_mut() else {
            return Err(BusError::Protocol("frame is not a JSON object".to_string()));
        };

        let event = match obj.remove("event") {
            Some(Value::String(s)) => s,
            Some(_) => return Err(BusError::Protocol("'event' is not a string".to_string())),
            None => return Err(BusError::Protocol("missing 'event' field".to_string())),
        };

        let data = match obj.remove("data") {
            Some(v @ Value::Object(_)) => v,
            Some(_) => return Err(BusError::Protocol("'data' is not an object".to_string())),
            None => return Err(BusError::Protocol("missing 'data' field".to_string())),
        };

        let ack_id = match obj.remove("ackId") {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(_) => return Err(BusError::Protocol("'ackId' is not a string".to_string())),
        };

        Ok(Self {
            event,
            data,
            ack_id,
        })
    }

    /// Encodes the frame as JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Protocol`] if serialization fails (practically
    /// unreachable for JSON values).
    pub fn encode(&self) -> Result<String, BusError> {
        serde_json::to_string(self).map_err(|err| BusError::Protocol(err.to_string()))
    }
}
