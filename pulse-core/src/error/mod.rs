//! Error types and handling framework.
//!
//! Domain-specific error categories shared by the Pulse crates:
//! - `ConfigError` - configuration loading and validation errors
//! - `NetworkError` - connection and transport errors
//!
//! Each category exposes `severity()` so callers can decide between retrying
//! and giving up without matching on individual variants.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error severity levels for categorizing errors.
///
/// # Examples
///
/// ```
/// use pulse_core::error::ErrorSeverity;
///
/// let severity = ErrorSeverity::Recoverable;
/// assert!(severity.is_recoverable());
/// assert!(!severity.is_fatal());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ErrorSeverity {
    /// Unrecoverable error requiring immediate attention.
    Fatal,

    /// Error that can be recovered from through retry or fallback.
    #[default]
    Recoverable,

    /// Non-critical issue that should be logged but doesn't prevent operation.
    Warning,
}

impl ErrorSeverity {
    /// Returns true if this error is recoverable (not fatal).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Fatal)
    }

    /// Returns true if this error is fatal (unrecoverable).
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal)
    }

    /// Returns the severity as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fatal => "FATAL",
            Self::Recoverable => "RECOVERABLE",
            Self::Warning => "WARNING",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

mod config;
mod network;

pub use config::ConfigError;
pub use network::NetworkError;
