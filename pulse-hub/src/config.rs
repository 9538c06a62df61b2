//! Hub configuration types.
//!
//! This module provides configuration for the hub server including:
//! - Server binding address and port
//! - JWT verification settings
//! - CORS settings
//! - WebSocket settings

use pulse_core::config::{EnvOverride, Validatable};
use pulse_core::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ws::WsConfig;

/// Hub server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// JWT configuration
    #[serde(default)]
    pub jwt: JwtConfig,

    /// CORS configuration
    #[serde(default)]
    pub cors: CorsConfig,

    /// WebSocket configuration
    #[serde(default)]
    pub websocket: WsConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            jwt: JwtConfig::default(),
            cors: CorsConfig::default(),
            websocket: WsConfig::default(),
        }
    }
}

impl HubConfig {
    /// Returns the server bind address.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Applies `<prefix>_*` environment variables on top of the loaded values.
    pub fn apply_env_overrides(&mut self, prefix: &str) {
        EnvOverride::apply_string(&format!("{prefix}_SERVER_HOST"), &mut self.host);
        EnvOverride::apply_number(&format!("{prefix}_SERVER_PORT"), &mut self.port);
        EnvOverride::apply_string(&format!("{prefix}_JWT_SECRET"), &mut self.jwt.secret);
        EnvOverride::apply_bool(
            &format!("{prefix}_WS_ALLOW_ANONYMOUS"),
            &mut self.websocket.allow_anonymous,
        );
        EnvOverride::apply_number(
            &format!("{prefix}_WS_PING_INTERVAL_SECS"),
            &mut self.websocket.ping_interval_secs,
        );
        EnvOverride::apply_number(
            &format!("{prefix}_WS_PONG_TIMEOUT_SECS"),
            &mut self.websocket.pong_timeout_secs,
        );
    }
}

impl Validatable for HubConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::invalid_value("port", "must not be 0"));
        }
        if self.jwt.secret.trim().is_empty() {
            return Err(ConfigError::missing_field("jwt.secret"));
        }
        self.websocket.validate()
    }
}

/// JWT verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for verifying tokens (should be loaded from environment in production)
    #[serde(default = "default_jwt_secret")]
    pub secret: String,

    /// Token expiration time in seconds
    #[serde(default = "default_token_expiration")]
    pub expiration_secs: u64,

    /// Issuer claim
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Audience claim
    #[serde(default = "default_audience")]
    pub audience: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: default_jwt_secret(),
            expiration_secs: default_token_expiration(),
            issuer: default_issuer(),
            audience: default_audience(),
        }
    }
}

impl JwtConfig {
    /// Returns the token expiration duration.
    #[must_use]
    pub fn expiration(&self) -> Duration {
        Duration::from_secs(self.expiration_secs)
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Enable CORS
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Allowed origins (empty means all origins)
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Allow credentials
    #[serde(default)]
    pub allow_credentials: bool,

    /// Max age for preflight cache in seconds
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec![],
            allow_credentials: false,
            max_age_secs: default_max_age(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_jwt_secret() -> String {
    // In production, this should be loaded from environment
    "change-me-in-production".to_string()
}

fn default_token_expiration() -> u64 {
    3600 // 1 hour
}

fn default_issuer() -> String {
    "pulse".to_string()
}

fn default_audience() -> String {
    "pulse-dashboard".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_age() -> u64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_config_default() {
        let config = HubConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert!(config.jwt.expiration_secs > 0);
        assert!(config.cors.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bind_address() {
        let config = HubConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            ..Default::default()
        };
        assert_eq!(config.bind_address(), "127.0.0.1:3000");
    }

    #[test]
    fn test_jwt_config_expiration() {
        let config = JwtConfig {
            expiration_secs: 7200,
            ..Default::default()
        };
        assert_eq!(config.expiration(), Duration::from_secs(7200));
    }

    #[test]
    fn test_validation() {
        let mut config = HubConfig::default();
        config.jwt.secret = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = HubConfig::default();
        config.websocket.pong_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nested_yaml() {
        let yaml = r"
port: 9000
jwt:
  secret: s3cret
websocket:
  ping_interval_secs: 10
";
        let config: HubConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.jwt.secret, "s3cret");
        assert_eq!(config.websocket.ping_interval_secs, 10);
        assert_eq!(config.websocket.pong_timeout_secs, 60);
    }
}
