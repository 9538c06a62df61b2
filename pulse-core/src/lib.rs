//! # Pulse Core
//!
//! Core types, errors, and configuration loading shared by the Pulse crates.
//!
//! This crate provides:
//! - `NewType` wrappers for market primitives (`Symbol`, `Price`)
//! - Ticker validation and normalization across A-share, Hong Kong and US markets
//! - Error types for configuration and network failures
//! - Configuration management with YAML/TOML/JSON support and environment variable overrides

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_const_for_fn)]

/// Core type definitions and `NewType` wrappers
pub mod types;

/// Error types and handling
pub mod error;

/// Configuration management
pub mod config;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::types::*;
}
