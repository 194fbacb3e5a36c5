//! Typed envelope framing for the `WatchParty` wire protocol.
//!
//! Every WebSocket text frame, in both directions, is a JSON-encoded
//! [`Envelope`]: `{"type": "<event-name>", "payload": {...}, "timestamp": <ms>}`.
//! The `type` string determines the payload shape; [`crate::client`] and
//! [`crate::server`] enumerate the fixed event sets for each direction.

use serde::{Deserialize, Serialize};

/// Error type for envelope encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// The wire unit exchanged over a room connection.
///
/// The payload is kept as an opaque [`serde_json::Value`] at this layer;
/// typed interpretation happens in [`crate::client::ClientEvent`] and
/// [`crate::server::ServerEvent`] based on `event_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name, e.g. `chat:message` or `video:state`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event-specific payload object.
    pub payload: serde_json::Value,
    /// Milliseconds since the UNIX epoch at the producer.
    pub timestamp: u64,
}

impl Envelope {
    /// Creates an envelope stamped with the current time.
    #[must_use]
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            timestamp: now_millis(),
        }
    }
}

/// Current time as milliseconds since the UNIX epoch.
#[must_use]
pub fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

/// Encodes an [`Envelope`] into its JSON text form.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the envelope cannot be
/// serialized.
pub fn encode(envelope: &Envelope) -> Result<String, CodecError> {
    serde_json::to_string(envelope).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes an [`Envelope`] from JSON text.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the text is not a valid
/// envelope. Malformed frames never panic; callers are expected to log
/// and drop them.
pub fn decode(text: &str) -> Result<Envelope, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::Serialization(e.to_string()))
}
