//! Hub client configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for [`HubClient`](crate::HubClient).
///
/// Contains the endpoint, the credential and reconnection parameters.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Hub WebSocket endpoint, e.g. `ws://localhost:8080/ws`.
    pub url: String,

    /// Bearer credential sent in the `Authorization` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Whether automatic reconnection is enabled.
    #[serde(default = "default_reconnect_enabled")]
    pub reconnect_enabled: bool,

    /// Maximum number of reconnection attempts (0 = unlimited).
    #[serde(default)]
    pub max_reconnect_attempts: u32,

    /// Initial reconnection delay in milliseconds.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Maximum reconnection delay in milliseconds.
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Backoff multiplier for exponential backoff.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Capacity of the outbound frame queue.
    #[serde(default = "default_outbound_queue_size")]
    pub outbound_queue_size: usize,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field(
                "token",
                &self.token.as_deref().map(pulse_telemetry::masking::mask_token),
            )
            .field("reconnect_enabled", &self.reconnect_enabled)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .finish_non_exhaustive()
    }
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_enabled() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_max_reconnect_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_outbound_queue_size() -> usize {
    100
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_enabled: default_reconnect_enabled(),
            max_reconnect_attempts: 0,
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            outbound_queue_size: default_outbound_queue_size(),
        }
    }
}

impl ClientConfig {
    /// Creates a new builder for `ClientConfig`.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Returns the connection timeout as a Duration.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Calculates the delay before reconnect attempt `attempt` (zero based).
    ///
    /// Grows by `backoff_multiplier` per attempt and is capped at
    /// `max_reconnect_delay_ms`.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn calculate_reconnect_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.reconnect_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped_delay = delay.min(self.max_reconnect_delay_ms as f64) as u64;
        Duration::from_millis(capped_delay)
    }

    /// Returns whether reconnect attempt `attempt` (zero based) may run.
    #[must_use]
    pub fn should_reconnect(&self, attempt: u32) -> bool {
        self.reconnect_enabled
            && (self.max_reconnect_attempts == 0 || attempt < self.max_reconnect_attempts)
    }
}

/// Builder for `ClientConfig`.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfigOverrides,
}

#[derive(Debug, Default)]
struct ClientConfigOverrides {
    url: Option<String>,
    token: Option<String>,
    connect_timeout_ms: Option<u64>,
    reconnect_enabled: Option<bool>,
    max_reconnect_attempts: Option<u32>,
    reconnect_delay_ms: Option<u64>,
    max_reconnect_delay_ms: Option<u64>,
    backoff_multiplier: Option<f64>,
    outbound_queue_size: Option<usize>,
}

#[allow(clippy::cast_possible_truncation)]
fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

impl ClientConfigBuilder {
    /// Sets the hub URL.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = Some(url.into());
        self
    }

    /// Sets the bearer credential.
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.token = Some(token.into());
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = Some(millis(timeout));
        self
    }

    /// Sets whether reconnection is enabled.
    #[must_use]
    pub fn reconnect_enabled(mut self, enabled: bool) -> Self {
        self.config.reconnect_enabled = Some(enabled);
        self
    }

    /// Sets the maximum reconnection attempts.
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = Some(attempts);
        self
    }

    /// Sets the initial reconnection delay.
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay_ms = Some(millis(delay));
        self
    }

    /// Sets the maximum reconnection delay.
    #[must_use]
    pub fn max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.max_reconnect_delay_ms = Some(millis(delay));
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.config.backoff_multiplier = Some(multiplier);
        self
    }

    /// Sets the outbound queue capacity.
    #[must_use]
    pub fn outbound_queue_size(mut self, size: usize) -> Self {
        self.config.outbound_queue_size = Some(size);
        self
    }

    /// Builds the `ClientConfig`.
    #[must_use]
    pub fn build(self) -> ClientConfig {
        let o = self.config;
        ClientConfig {
            url: o.url.unwrap_or_default(),
            token: o.token,
            connect_timeout_ms: o
                .connect_timeout_ms
                .unwrap_or_else(default_connect_timeout_ms),
            reconnect_enabled: o.reconnect_enabled.unwrap_or_else(default_reconnect_enabled),
            max_reconnect_attempts: o.max_reconnect_attempts.unwrap_or_default(),
            reconnect_delay_ms: o.reconnect_delay_ms.unwrap_or_else(default_reconnect_delay_ms),
            max_reconnect_delay_ms: o
                .max_reconnect_delay_ms
                .unwrap_or_else(default_max_reconnect_delay_ms),
            backoff_multiplier: o
                .backoff_multiplier
                .unwrap_or_else(default_backoff_multiplier),
            outbound_queue_size: o
                .outbound_queue_size
                .unwrap_or_else(default_outbound_queue_size)
                .max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::builder()
            .url("ws://localhost:8080/ws")
            .token("secret-token-value")
            .connect_timeout(Duration::from_secs(15))
            .max_reconnect_attempts(5)
            .build();

        assert_eq!(config.url, "ws://localhost:8080/ws");
        assert_eq!(config.token.as_deref(), Some("secret-token-value"));
        assert_eq!(config.connect_timeout(), Duration::from_secs(15));
        assert!(config.reconnect_enabled);
        assert_eq!(config.max_reconnect_attempts, 5);
    }

    #[test]
    fn test_debug_masks_token() {
        let config = ClientConfig::builder().token("secret-token-value").build();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-token-value"));
    }

    #[test]
    fn test_exponential_backoff() {
        let config = ClientConfig::builder()
            .reconnect_delay(Duration::from_secs(1))
            .max_reconnect_delay(Duration::from_secs(60))
            .backoff_multiplier(2.0)
            .build();

        assert_eq!(config.calculate_reconnect_delay(0), Duration::from_secs(1));
        assert_eq!(config.calculate_reconnect_delay(1), Duration::from_secs(2));
        assert_eq!(config.calculate_reconnect_delay(3), Duration::from_secs(8));
        assert_eq!(config.calculate_reconnect_delay(10), Duration::from_secs(60));
        assert_eq!(config.calculate_reconnect_delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_should_reconnect() {
        let config = ClientConfig::builder().max_reconnect_attempts(3).build();
        assert!(config.should_reconnect(2));
        assert!(!config.should_reconnect(3));

        let unlimited = ClientConfig::default();
        assert!(unlimited.should_reconnect(100));

        let disabled = ClientConfig::builder().reconnect_enabled(false).build();
        assert!(!disabled.should_reconnect(0));
    }

    #[test]
    fn test_partial_deserialization() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"url": "ws://hub/ws", "reconnect_delay_ms": 250}"#).unwrap();
        assert_eq!(config.reconnect_delay_ms, 250);
        assert_eq!(config.max_reconnect_delay_ms, 30_000);
        assert!(config.token.is_none());
    }
}
