//! WebSocket hub configuration.
//!
//! This module provides configuration for connection handling including:
//! - Heartbeat interval and pong timeout
//! - Anonymous access and user-scoped channels
//! - Per-connection queue, message and symbol limits
//! - Message compression settings

use pulse_core::config::Validatable;
use pulse_core::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// WebSocket hub configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    /// Interval between server pings in seconds
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Time without a pong, after a ping was sent, before a connection is reaped
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,

    /// Admit connections that present no credential
    #[serde(default = "default_true")]
    pub allow_anonymous: bool,

    /// Maximum number of queued outbound envelopes per connection
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Maximum inbound message size in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Maximum number of symbols one connection may hold
    #[serde(default = "default_max_symbols")]
    pub max_symbols_per_connection: usize,

    /// Prefix of channels owned by a single user (`user:<userId>`)
    #[serde(default = "default_user_channel_prefix")]
    pub user_channel_prefix: String,

    /// Consecutive rejected deliveries before a connection is reaped
    #[serde(default = "default_delivery_failure_threshold")]
    pub delivery_failure_threshold: u32,

    /// Send the stored quote right after a successful subscribe
    #[serde(default = "default_true")]
    pub snapshot_on_subscribe: bool,

    /// Gzip large outbound messages into binary frames
    #[serde(default)]
    pub enable_compression: bool,

    /// Compression threshold in bytes (messages smaller than this won't be compressed)
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval(),
            pong_timeout_secs: default_pong_timeout(),
            allow_anonymous: true,
            max_queue_size: default_max_queue_size(),
            max_message_size: default_max_message_size(),
            max_symbols_per_connection: default_max_symbols(),
            user_channel_prefix: default_user_channel_prefix(),
            delivery_failure_threshold: default_delivery_failure_threshold(),
            snapshot_on_subscribe: true,
            enable_compression: false,
            compression_threshold: default_compression_threshold(),
        }
    }
}

impl WsConfig {
    /// Returns the ping interval as a Duration.
    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Returns the pong timeout as a Duration.
    #[must_use]
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }
}

impl Validatable for WsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.ping_interval_secs == 0 {
            return Err(ConfigError::invalid_value(
                "websocket.ping_interval_secs",
                "must be positive",
            ));
        }
        if self.pong_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "websocket.pong_timeout_secs",
                "must be positive",
            ));
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::invalid_value(
                "websocket.max_queue_size",
                "must be positive",
            ));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::invalid_value(
                "websocket.max_message_size",
                "must be positive",
            ));
        }
        if self.delivery_failure_threshold == 0 {
            return Err(ConfigError::invalid_value(
                "websocket.delivery_failure_threshold",
                "must be positive",
            ));
        }
        if self.user_channel_prefix.is_empty() {
            return Err(ConfigError::missing_field("websocket.user_channel_prefix"));
        }
        Ok(())
    }
}

fn default_ping_interval() -> u64 {
    30
}

fn default_pong_timeout() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_max_queue_size() -> usize {
    1000
}

fn default_max_message_size() -> usize {
    64 * 1024
}

fn default_max_symbols() -> usize {
    200
}

fn default_user_channel_prefix() -> String {
    "user:".to_string()
}

fn default_delivery_failure_threshold() -> u32 {
    3
}

fn default_compression_threshold() -> usize {
    1024 // 1KB
}
