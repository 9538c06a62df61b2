//! Network-related error types.
//!
//! Errors raised while establishing or keeping a connection to the hub.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ErrorSeverity;

/// Network error type covering connection failures, timeouts, and WebSocket errors.
///
/// # Examples
///
/// ```
/// use pulse_core::error::NetworkError;
///
/// let error = NetworkError::ConnectionFailed {
///     reason: "Connection refused".to_string(),
/// };
/// assert!(error.to_string().contains("Connection refused"));
/// assert!(error.is_recoverable());
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkError {
    /// Connection to remote host failed.
    #[error("[Network] Connection failed: {reason}")]
    ConnectionFailed {
        /// Reason for the connection failure.
        reason: String,
    },

    /// Connection timed out.
    #[error("[Network] Connection timeout after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// WebSocket error occurred.
    #[error("[Network] WebSocket error: {reason}")]
    WebSocket {
        /// Reason for the WebSocket error.
        reason: String,
    },

    /// Connection was closed by the peer.
    #[error("[Network] Connection closed ({code}): {reason}")]
    ConnectionClosed {
        /// Close code sent by the peer.
        code: u16,
        /// Reason for the connection closure.
        reason: String,
    },

    /// The peer rejected our credentials.
    #[error("[Network] Authentication rejected ({code}): {reason}")]
    AuthRejected {
        /// Close code sent by the peer.
        code: u16,
        /// Reason given by the peer.
        reason: String,
    },
}

impl NetworkError {
    /// Returns true if this error is recoverable (can be retried).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.severity().is_recoverable()
    }

    /// Returns the severity level of this error.
    #[must_use]
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::AuthRejected { .. } => ErrorSeverity::Fatal,
            Self::Timeout { .. }
            | Self::ConnectionFailed { .. }
            | Self::ConnectionClosed { .. }
            | Self::WebSocket { .. } => ErrorSeverity::Recoverable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout() {
        let error = NetworkError::Timeout { timeout_ms: 5000 };
        assert!(error.to_string().contains("5000ms"));
        assert!(error.is_recoverable());
    }

    #[test]
    fn test_auth_rejected_is_fatal() {
        let error = NetworkError::AuthRejected {
            code: 4001,
            reason: "auth_invalid".to_string(),
        };
        assert!(!error.is_recoverable());
        assert!(error.to_string().contains("4001"));
    }

    #[test]
    fn test_connection_closed_is_recoverable() {
        let error = NetworkError::ConnectionClosed {
            code: 4008,
            reason: "heartbeat_timeout".to_string(),
        };
        assert!(error.is_recoverable());
    }
}
