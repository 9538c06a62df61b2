//! Client connection state.

use pulse_core::error::NetworkError;
use serde::{Deserialize, Serialize};

/// Connection state of the hub client.
///
/// `Disconnected -> Connecting -> Connected -> (Error | Disconnected)`.
/// `Error` is terminal: the client stops reconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientState {
    /// Not connected.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Admitted by the hub.
    Connected,
    /// Rejected or out of reconnect attempts.
    Error,
}

impl ClientState {
    /// Returns true if the connection is active.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns true if the client will not reconnect on its own.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Snapshot published on the client's status channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStatus {
    /// Current state.
    pub state: ClientState,
    /// Consecutive failed attempts since the last admission.
    pub reconnect_attempts: u32,
    /// Id assigned by the hub while connected.
    pub connection_id: Option<String>,
    /// Why the last connection ended, if it did.
    pub last_error: Option<NetworkError>,
}

impl Default for ClientStatus {
    fn default() -> Self {
        Self {
            state: ClientState::Disconnected,
            reconnect_attempts: 0,
            connection_id: None,
            last_error: None,
        }
    }
}

impl ClientStatus {
    pub(crate) fn mark_connecting(&mut self) {
        self.state = ClientState::Connecting;
        self.connection_id = None;
    }

    pub(crate) fn mark_connected(&mut self, connection_id: String) {
        self.state = ClientState::Connected;
        self.reconnect_attempts = 0;
        self.connection_id = Some(connection_id);
        self.last_error = None;
    }

    pub(crate) fn mark_disconnected(&mut self, error: Option<NetworkError>) {
        self.state = ClientState::Disconnected;
        self.connection_id = None;
        if error.is_some() {
            self.last_error = error;
        }
    }

    pub(crate) fn mark_reconnecting(&mut self) {
        self.reconnect_attempts += 1;
    }

    pub(crate) fn mark_error(&mut self, error: NetworkError) {
        self.state = ClientState::Error;
        self.connection_id = None;
        self.last_error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_state_display() {
        assert_eq!(ClientState::Disconnected.to_string(), "Disconnected");
        assert_eq!(ClientState::Connected.to_string(), "Connected");
        assert_eq!(ClientState::Error.to_string(), "Error");
    }

    #[test]
    fn test_client_state_checks() {
        assert!(ClientState::Connected.is_connected());
        assert!(!ClientState::Connecting.is_connected());
        assert!(ClientState::Error.is_terminal());
        assert!(!ClientState::Disconnected.is_terminal());
    }

    #[test]
    fn test_status_transitions() {
        let mut status = ClientStatus::default();
        assert_eq!(status.state, ClientState::Disconnected);

        status.mark_connecting();
        status.mark_connected("conn-1".into());
        assert_eq!(status.connection_id.as_deref(), Some("conn-1"));

        let dropped = NetworkError::ConnectionClosed {
            code: 4008,
            reason: "heartbeat_timeout".into(),
        };
        status.mark_disconnected(Some(dropped.clone()));
        assert_eq!(status.state, ClientState::Disconnected);
        assert!(status.connection_id.is_none());
        assert_eq!(status.last_error, Some(dropped));

        status.mark_reconnecting();
        status.mark_reconnecting();
        assert_eq!(status.reconnect_attempts, 2);

        status.mark_connecting();
        status.mark_connected("conn-2".into());
        assert_eq!(status.reconnect_attempts, 0);
        assert!(status.last_error.is_none());
    }

    #[test]
    fn test_error_is_terminal() {
        let mut status = ClientStatus::default();
        status.mark_error(NetworkError::AuthRejected {
            code: 4001,
            reason: "auth_invalid".into(),
        });
        assert!(status.state.is_terminal());
    }
}
