//! Wire envelope and codec used by the client.

use flate2::read::GzDecoder;
use pulse_core::error::NetworkError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io::Read;
use tokio_tungstenite::tungstenite::Message;

/// Channel carrying symbol quotes.
pub const QUOTES_CHANNEL: &str = "quotes";

/// Envelope exchanged with the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type
    #[serde(rename = "type")]
    pub kind: String,
    /// Unique per envelope
    #[serde(default)]
    pub id: String,
    /// Milliseconds since the epoch
    #[serde(default)]
    pub timestamp: i64,
    /// Optional channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Payload
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Creates an envelope with a fresh id and the current time.
    #[must_use]
    pub fn new(kind: impl Into<String>, channel: Option<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            channel,
            data,
        }
    }

    /// Quote subscription request.
    #[must_use]
    pub fn subscribe<S: AsRef<str>>(symbols: &[S]) -> Self {
        Self::subscription("subscribe", symbols)
    }

    /// Quote unsubscription request.
    #[must_use]
    pub fn unsubscribe<S: AsRef<str>>(symbols: &[S]) -> Self {
        Self::subscription("unsubscribe", symbols)
    }

    fn subscription<S: AsRef<str>>(action: &str, symbols: &[S]) -> Self {
        let symbols: Vec<&str> = symbols.iter().map(AsRef::as_ref).collect();
        Self::new(
            "subscription",
            Some(QUOTES_CHANNEL.to_string()),
            json!({ "action": action, "symbols": symbols }),
        )
    }

    /// Reply to a hub ping.
    #[must_use]
    pub fn pong() -> Self {
        Self::new("pong", None, json!({}))
    }

    /// Returns true for a hub heartbeat request.
    #[must_use]
    pub fn is_ping(&self) -> bool {
        self.kind == "ping"
    }

    /// Connection id carried by a `connect` envelope.
    #[must_use]
    pub fn connection_id(&self) -> Option<&str> {
        if self.kind != "connect" {
            return None;
        }
        self.data.get("connectionId").and_then(Value::as_str)
    }
}

/// Envelope codec.
///
/// The hub may gzip large envelopes into binary frames; both directions use
/// JSON otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageCodec;

impl MessageCodec {
    /// Encodes an envelope as a text frame.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` if serialization fails.
    pub fn encode(envelope: &Envelope) -> Result<Message, NetworkError> {
        let json = serde_json::to_string(envelope).map_err(|e| NetworkError::WebSocket {
            reason: format!("Failed to serialize envelope: {e}"),
        })?;
        Ok(Message::Text(json))
    }

    /// Decodes a data frame. Returns `Ok(None)` for control frames.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` if the payload is not a valid envelope.
    pub fn decode(message: &Message) -> Result<Option<Envelope>, NetworkError> {
        match message {
            Message::Text(text) => Self::decode_str(text).map(Some),
            Message::Binary(data) => {
                let mut text = String::new();
                GzDecoder::new(data.as_slice())
                    .read_to_string(&mut text)
                    .map_err(|e| NetworkError::WebSocket {
                        reason: format!("Failed to decompress frame: {e}"),
                    })?;
                Self::decode_str(&text).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Decodes a JSON envelope.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` if deserialization fails.
    pub fn decode_str(json: &str) -> Result<Envelope, NetworkError> {
        serde_json::from_str(json).map_err(|e| NetworkError::WebSocket {
            reason: format!("Failed to deserialize envelope: {e}"),
        })
    }
}
