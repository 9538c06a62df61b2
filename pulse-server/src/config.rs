//! Server configuration module.
//!
//! One file carries the hub settings plus everything the binary wires around
//! it: logging, metrics, the simulated feed and shutdown.

use pulse_core::config::{EnvOverride, Validatable};
use pulse_core::error::ConfigError;
use pulse_hub::HubConfig;
use pulse_telemetry::logging::LogConfig;
use pulse_telemetry::metrics::MetricsConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "PULSE";

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hub settings: bind address, JWT, CORS, WebSocket.
    #[serde(default)]
    pub server: HubConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LogConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Simulated upstream feed.
    #[serde(default)]
    pub feed: FeedConfig,

    /// Shutdown configuration.
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl ServerConfig {
    /// Applies `PULSE_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.server.apply_env_overrides(ENV_PREFIX);
        EnvOverride::apply_string(&format!("{ENV_PREFIX}_LOG_LEVEL"), &mut self.logging.level);
        EnvOverride::apply_bool(&format!("{ENV_PREFIX}_METRICS_ENABLED"), &mut self.metrics.enabled);
        self.feed.apply_env_overrides();
        self.shutdown.apply_env_overrides();
    }
}

impl Validatable for ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if self.logging.outputs.is_empty() {
            return Err(ConfigError::invalid_value(
                "logging.outputs",
                "at least one output is required",
            ));
        }
        self.feed.validate()?;
        self.shutdown.validate()
    }
}

/// Simulated feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Time between quotes for one symbol, in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Capacity of the channel between the feed and the hub.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Largest move per tick, in basis points.
    #[serde(default = "default_volatility_bps")]
    pub volatility_bps: u32,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_buffer_size() -> usize {
    1024
}

fn default_volatility_bps() -> u32 {
    50
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            buffer_size: default_buffer_size(),
            volatility_bps: default_volatility_bps(),
        }
    }
}

impl FeedConfig {
    /// Applies environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        EnvOverride::apply_number(&format!("{ENV_PREFIX}_FEED_INTERVAL_MS"), &mut self.interval_ms);
        EnvOverride::apply_number(
            &format!("{ENV_PREFIX}_FEED_VOLATILITY_BPS"),
            &mut self.volatility_bps,
        );
    }

    /// Returns the tick interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Validatable for FeedConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::invalid_value("feed.interval_ms", "must not be 0"));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::invalid_value("feed.buffer_size", "must not be 0"));
        }
        if self.volatility_bps > 10_000 {
            return Err(ConfigError::invalid_value(
                "feed.volatility_bps",
                "must not exceed 10000",
            ));
        }
        Ok(())
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Timeout for graceful shutdown in seconds.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl ShutdownConfig {
    /// Applies environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        EnvOverride::apply_number(
            &format!("{ENV_PREFIX}_SHUTDOWN_TIMEOUT"),
            &mut self.timeout_secs,
        );
    }

    /// Returns the shutdown timeout as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Validatable for ShutdownConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "shutdown.timeout_secs",
                "must not be 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::config::ConfigLoader;
    use std::io::Write;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.server.port, HubConfig::default().port);
        assert_eq!(config.feed.interval(), Duration::from_secs(1));
        assert_eq!(config.shutdown.timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            r"
server:
  host: 127.0.0.1
  port: 9100
  websocket:
    allow_anonymous: false
    ping_interval_secs: 10
logging:
  level: debug
  format: pretty
feed:
  interval_ms: 250
"
        )
        .unwrap();

        let config: ServerConfig = ConfigLoader::new()
            .with_env_prefix(ENV_PREFIX)
            .load_file(file.path())
            .unwrap();

        assert_eq!(config.server.bind_address(), "127.0.0.1:9100");
        assert!(!config.server.websocket.allow_anonymous);
        assert_eq!(config.server.websocket.ping_interval_secs, 10);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.feed.interval_ms, 250);
        assert_eq!(config.feed.buffer_size, 1024);
        assert_eq!(config.shutdown.timeout_secs, 30);
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9200

[server.jwt]
secret = "from-file"

[shutdown]
timeout_secs = 5
"#
        )
        .unwrap();

        let config: ServerConfig = ConfigLoader::new().load_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9200);
        assert_eq!(config.server.jwt.secret, "from-file");
        assert_eq!(config.shutdown.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ServerConfig::default();
        config.feed.interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.shutdown.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.server.jwt.secret = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.logging.outputs.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = ServerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.shutdown.timeout_secs, parsed.shutdown.timeout_secs);
        assert_eq!(config.feed.interval_ms, parsed.feed.interval_ms);
    }
}
