//! # Pulse Telemetry
//!
//! Logging, tracing spans and metrics for the Pulse real-time hub.
//!
//! This crate provides:
//! - Structured logging with JSON and pretty formats
//! - Rolling log files through non-blocking writers
//! - Credential masking for anything that ends up in a log line
//! - Span helpers for per-connection tracing
//! - Prometheus metrics export

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

/// Logging configuration and initialization
pub mod logging;

/// Sensitive data masking
pub mod masking;

/// Span definitions for connection tracing
pub mod spans;

/// Metrics collection and export
pub mod metrics;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::logging::{LogConfig, LogFormat, LogOutput, init_logging};
    pub use crate::masking::{SensitiveDataMasker, mask_token};
    pub use crate::metrics::{MetricsConfig, PulseMetrics, init_metrics, render_metrics};
    pub use crate::spans::*;
}
