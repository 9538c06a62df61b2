//! Hub error types.
//!
//! One enum per failure domain:
//! - `AuthError` - credential problems at connection time
//! - `SubscriptionError` - per-symbol failures reported inside acks
//! - `DeliveryError` - outbound queue rejections
//! - `RoutingError` - inbound envelopes that could not be handled
//! - `ChannelError` - generic channel join refusals
//! - `HubError` - HTTP-facing errors

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::feed::FeedError;
use crate::ws::message::CloseReason;

/// Error type a message handler may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Credential failures. The connection is closed and never retried server-side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No credential and anonymous access is disabled
    #[error("credential required")]
    MissingCredential,

    /// Credential present but not acceptable
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// Credential was valid once but has expired
    #[error("credential expired")]
    Expired,
}

impl AuthError {
    /// Close reason sent to the client.
    #[must_use]
    pub const fn close_reason(&self) -> CloseReason {
        match self {
            Self::MissingCredential => CloseReason::AuthRequired,
            Self::InvalidCredential(_) | Self::Expired => CloseReason::AuthInvalid,
        }
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing",
            Self::InvalidCredential(_) => "invalid",
            Self::Expired => "expired",
        }
    }
}

/// Per-symbol subscription failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// Ticker failed validation or the feed does not know it
    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    /// The upstream feed could not open a subscription
    #[error("upstream feed unavailable: {0}")]
    FeedUnavailable(String),

    /// The connection already holds the maximum number of symbols
    #[error("symbol limit of {limit} reached")]
    LimitExceeded {
        /// Configured per-connection limit
        limit: usize,
    },

    /// The connection went away while the request was in flight
    #[error("connection closed")]
    Cancelled,
}

impl SubscriptionError {
    /// Machine-readable reason used in acks.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InvalidSymbol(_) => "invalid_symbol",
            Self::FeedUnavailable(_) => "feed_unavailable",
            Self::LimitExceeded { .. } => "limit_exceeded",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<FeedError> for SubscriptionError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::UnknownSymbol(symbol) => Self::InvalidSymbol(symbol),
            FeedError::Unavailable(reason) => Self::FeedUnavailable(reason),
        }
    }
}

/// Outbound delivery failure for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The connection's outbound queue is full
    #[error("outbound queue full")]
    QueueFull,

    /// The connection is not open anymore
    #[error("connection closed")]
    Closed,
}

/// Failure to route an inbound envelope.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// No handler registered for the envelope
    #[error("no handler for type '{kind}' on channel '{}'", channel.as_deref().unwrap_or("-"))]
    Unroutable {
        /// Envelope type
        kind: String,
        /// Envelope channel
        channel: Option<String>,
    },

    /// Known envelope type with a malformed payload
    #[error("invalid '{kind}' payload: {reason}")]
    InvalidPayload {
        /// Envelope type
        kind: String,
        /// What was wrong
        reason: String,
    },

    /// The handler ran and failed
    #[error("handler for '{kind}' failed: {source}")]
    HandlerFailed {
        /// Envelope type
        kind: String,
        /// Underlying error
        #[source]
        source: HandlerError,
    },
}

/// Generic channel join refusal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Channel name is empty, too long or contains whitespace
    #[error("invalid channel name: {0}")]
    InvalidName(String),

    /// Channel belongs to another user or requires authentication
    #[error("channel '{0}' is user-scoped")]
    UserScoped(String),

    /// Connection is not open
    #[error("connection is not open")]
    NotOpen,
}

impl ChannelError {
    /// Machine-readable reason used in acks.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InvalidName(_) => "invalid_channel",
            Self::UserScoped(_) => "forbidden",
            Self::NotOpen => "not_open",
        }
    }
}

/// HTTP-facing error type.
#[derive(Debug, Error)]
pub enum HubError {
    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Bad request / validation error
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Service unavailable
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl HubError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Returns the error code string.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error status
    pub status: &'static str,
    /// Error code
    pub code: &'static str,
    /// Error message
    pub message: String,
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            status: "error",
            code: self.error_code(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for HTTP-facing operations.
pub type HubResult<T> = Result<T, HubError>;
