//! Client error type.

use pulse_core::error::NetworkError;
use pulse_core::types::ValidationError;
use thiserror::Error;

/// Error returned by [`HubClient`](crate::HubClient) operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request needs a live connection and none is open
    #[error("not connected to the hub")]
    NotConnected,

    /// The client gave up: credentials were rejected or reconnects ran out
    #[error("client stopped: {0}")]
    Stopped(NetworkError),

    /// A ticker matched no supported market format
    #[error("invalid symbol: {0}")]
    InvalidSymbol(#[from] ValidationError),

    /// Transport failure
    #[error(transparent)]
    Network(#[from] NetworkError),
}
