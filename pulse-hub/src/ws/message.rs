//! Wire envelope and the typed messages carried inside it.
//!
//! Every frame in both directions is an [`Envelope`]. Inbound envelopes are
//! decoded into a [`ClientMessage`] at the router's dispatch boundary;
//! outbound traffic is built from a [`ServerMessage`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::Identity;
use crate::feed::QuoteUpdate;

/// Channel carrying symbol quotes.
pub const QUOTES_CHANNEL: &str = "quotes";

/// Envelope type names used by the hub.
pub mod kinds {
    /// Admission notice
    pub const CONNECT: &str = "connect";
    /// Subscribe / unsubscribe request
    pub const SUBSCRIPTION: &str = "subscription";
    /// Subscription outcome
    pub const ACK: &str = "ack";
    /// Quote update or snapshot
    pub const QUOTE: &str = "quote";
    /// Heartbeat request
    pub const PING: &str = "ping";
    /// Heartbeat reply
    pub const PONG: &str = "pong";
    /// Error notice
    pub const ERROR: &str = "error";
}

/// The structured unit exchanged over a connection.
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

    /// Channel name, if any.
    #[must_use]
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }
}

/// Subscription direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionAction {
    /// Start receiving
    Subscribe,
    /// Stop receiving
    Unsubscribe,
}

#[derive(Debug, Deserialize)]
struct SubscriptionPayload {
    action: SubscriptionAction,
    #[serde(default)]
    symbols: Vec<String>,
}

/// Inbound message, decoded from an envelope by its `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// `subscription`: join/leave a channel, or (on `quotes`) symbols
    Subscription {
        /// Direction
        action: SubscriptionAction,
        /// Raw tickers; validated per symbol by the multiplexer
        symbols: Vec<String>,
    },
    /// `ping`: liveness probe from the client
    Ping,
    /// `pong`: reply to a server ping
    Pong,
    /// Any other type; routed to custom handlers with the raw payload
    Custom {
        /// Envelope type
        kind: String,
        /// Payload
        data: Value,
    },
}

impl TryFrom<&Envelope> for ClientMessage {
    type Error = serde_json::Error;

    fn try_from(envelope: &Envelope) -> Result<Self, Self::Error> {
        match envelope.kind.as_str() {
            kinds::SUBSCRIPTION => {
                let payload = SubscriptionPayload::deserialize(&envelope.data)?;
                Ok(Self::Subscription {
                    action: payload.action,
                    symbols: payload.symbols,
                })
            }
            kinds::PING => Ok(Self::Ping),
            kinds::PONG => Ok(Self::Pong),
            other => Ok(Self::Custom {
                kind: other.to_string(),
                data: envelope.data.clone(),
            }),
        }
    }
}

/// One failed item inside an ack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckError {
    /// Symbol (or channel) the failure applies to
    pub symbol: String,
    /// Machine-readable reason
    pub error: String,
}

/// Payload of an `ack` envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckBody {
    /// True when nothing in the request failed
    pub success: bool,
    /// Items now subscribed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribed: Option<Vec<String>>,
    /// Items now unsubscribed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsubscribed: Option<Vec<String>>,
    /// Per-item failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<AckError>>,
}

impl AckBody {
    /// Builds a subscribe ack.
    #[must_use]
    pub fn subscribed(items: Vec<String>, errors: Vec<AckError>) -> Self {
        Self {
            success: errors.is_empty(),
            subscribed: Some(items),
            unsubscribed: None,
            errors: (!errors.is_empty()).then_some(errors),
        }
    }

    /// Builds an unsubscribe ack.
    #[must_use]
    pub fn unsubscribed(items: Vec<String>, errors: Vec<AckError>) -> Self {
        Self {
            success: errors.is_empty(),
            subscribed: None,
            unsubscribed: Some(items),
            errors: (!errors.is_empty()).then_some(errors),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectPayload {
    connection_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    identity: Option<Identity>,
}

#[derive(Serialize)]
struct QuotePayload {
    #[serde(flatten)]
    quote: QuoteUpdate,
    snapshot: bool,
}

#[derive(Serialize)]
struct ErrorPayload {
    code: String,
    message: String,
}

/// Outbound message.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    /// Sent once after admission
    Connect {
        /// Assigned connection id
        connection_id: String,
        /// Resolved identity, absent for anonymous connections
        identity: Option<Identity>,
    },
    /// Outcome of a subscription request
    Ack {
        /// Channel the request arrived on
        channel: String,
        /// Outcome
        body: AckBody,
    },
    /// Quote update, or the stored snapshot right after subscribing
    Quote {
        /// Quote
        update: QuoteUpdate,
        /// True for the post-subscribe snapshot
        snapshot: bool,
    },
    /// Heartbeat request
    Ping,
    /// Heartbeat reply
    Pong,
    /// Error notice; the connection stays open
    Error {
        /// Machine-readable code
        code: String,
        /// Human-readable message
        message: String,
    },
}

impl ServerMessage {
    /// Builds an error notice.
    #[must_use]
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Wraps the message in an envelope.
    pub fn into_envelope(self) -> Result<Envelope, serde_json::Error> {
        let envelope = match self {
            Self::Connect {
                connection_id,
                identity,
            } => Envelope::new(
                kinds::CONNECT,
                None,
                serde_json::to_value(ConnectPayload {
                    connection_id,
                    identity,
                })?,
            ),
            Self::Ack { channel, body } => {
                Envelope::new(kinds::ACK, Some(channel), serde_json::to_value(body)?)
            }
            Self::Quote { update, snapshot } => Envelope::new(
                kinds::QUOTE,
                Some(QUOTES_CHANNEL.to_string()),
                serde_json::to_value(QuotePayload {
                    quote: update,
                    snapshot,
                })?,
            ),
            Self::Ping => Envelope::new(
                kinds::PING,
                None,
                serde_json::json!({ "serverTime": chrono::Utc::now().timestamp_millis() }),
            ),
            Self::Pong => Envelope::new(
                kinds::PONG,
                None,
                serde_json::json!({ "serverTime": chrono::Utc::now().timestamp_millis() }),
            ),
            Self::Error { code, message } => Envelope::new(
                kinds::ERROR,
                None,
                serde_json::to_value(ErrorPayload { code, message })?,
            ),
        };
        Ok(envelope)
    }
}

/// Machine-readable reason a connection was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// Client or server closed normally
    Normal,
    /// The hub is shutting down
    ServerShutdown,
    /// The peer violated the protocol
    ProtocolError,
    /// No credential and anonymous access is disabled
    AuthRequired,
    /// Credential present but invalid or expired
    AuthInvalid,
    /// No pong within the configured timeout
    HeartbeatTimeout,
    /// Outbound queue kept rejecting envelopes
    DeliveryFailed,
}

impl CloseReason {
    /// WebSocket close code.
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::ServerShutdown => 1001,
            Self::ProtocolError => 1002,
            Self::AuthRequired => 4000,
            Self::AuthInvalid => 4001,
            Self::HeartbeatTimeout => 4008,
            Self::DeliveryFailed => 4009,
        }
    }

    /// Reason string sent in the close frame.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::ServerShutdown => "server_shutdown",
            Self::ProtocolError => "protocol_error",
            Self::AuthRequired => "auth_required",
            Self::AuthInvalid => "auth_invalid",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::DeliveryFailed => "delivery_failed",
        }
    }

    /// Looks a reason up by close code.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::Normal),
            1001 => Some(Self::ServerShutdown),
            1002 => Some(Self::ProtocolError),
            4000 => Some(Self::AuthRequired),
            4001 => Some(Self::AuthInvalid),
            4008 => Some(Self::HeartbeatTimeout),
            4009 => Some(Self::DeliveryFailed),
            _ => None,
        }
    }

    /// True for closures caused by the credential.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthRequired | Self::AuthInvalid)
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}
