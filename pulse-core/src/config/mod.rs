//! Configuration management module.
//!
//! This module provides:
//! - YAML, TOML and JSON configuration file formats
//! - Configuration validation with descriptive error messages
//! - Environment variable overrides for deployment-specific values
//!
//! # Example
//!
//! ```rust,ignore
//! use pulse_core::config::{ConfigLoader, ConfigFormat};
//!
//! // Load from YAML file
//! let config: MyConfig = ConfigLoader::new()
//!     .with_env_prefix("PULSE")
//!     .load_file("pulse.yaml")?;
//!
//! // Load from TOML string
//! let config: MyConfig = ConfigLoader::new()
//!     .load_str(toml_content, ConfigFormat::Toml)?;
//! ```

mod env;
mod loader;
mod traits;

pub use env::EnvOverride;
pub use loader::{ConfigFormat, ConfigLoader};
pub use traits::Validatable;
