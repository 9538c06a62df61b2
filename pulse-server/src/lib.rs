//! # Pulse Server
//!
//! Process wrapper around the Pulse hub.
//!
//! This crate provides:
//! - Configuration loading with `PULSE_*` environment overrides
//! - Logging and metrics initialization
//! - A simulated upstream quote feed
//! - Graceful shutdown on SIGINT/SIGTERM

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod feed;
pub mod server;
pub mod shutdown;

pub use config::ServerConfig;
pub use feed::SimulatedFeed;
pub use server::{PulseServer, ServerError, ServerState};
pub use shutdown::ShutdownController;
