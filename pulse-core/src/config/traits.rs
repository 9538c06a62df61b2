//! Configuration traits.

use crate::error::ConfigError;

/// Trait for configuration types that can be validated after loading.
///
/// # Example
///
/// ```rust
/// use pulse_core::config::Validatable;
/// use pulse_core::error::ConfigError;
///
/// struct ListenConfig {
///     port: u16,
///     host: String,
/// }
///
/// impl Validatable for ListenConfig {
///     fn validate(&self) -> Result<(), ConfigError> {
///         if self.port == 0 {
///             return Err(ConfigError::invalid_value("port", "Port cannot be 0"));
///         }
///         if self.host.is_empty() {
///             return Err(ConfigError::missing_field("host"));
///         }
///         Ok(())
///     }
/// }
///
/// let config = ListenConfig { port: 0, host: "localhost".into() };
/// assert!(config.validate().is_err());
/// ```
pub trait Validatable {
    /// Validates the configuration.
    ///
    /// Returns `Ok(())` if the configuration is valid, or a `ConfigError`
    /// describing the first problem found.
    fn validate(&self) -> Result<(), ConfigError>;
}
