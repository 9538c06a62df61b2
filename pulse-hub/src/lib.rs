//! # Pulse Hub
//!
//! Real-time distribution hub for the Pulse dashboard.
//!
//! This crate provides:
//! - A WebSocket endpoint with a credential gate at admission
//! - Per-symbol multiplexing of upstream quote subscriptions
//! - Typed envelope routing with wildcard fallback
//! - Channel and per-user fan-out over bounded, non-blocking queues
//! - Heartbeat reaping and graceful shutdown
//!
//! # Endpoints
//!
//! - `/ws` - WebSocket endpoint for real-time updates
//! - `/api/v1/health` - Health check
//! - `/api/v1/metrics` - Prometheus metrics
//!
//! # Authentication
//!
//! Credentials are JWTs passed either as `ws://host/ws?token=<jwt>` or in an
//! `Authorization: Bearer <jwt>` header. Anonymous connections are admitted
//! when `websocket.allow_anonymous` is set.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod error;
pub mod feed;
pub mod handlers;
pub mod hub;
pub mod routes;
pub mod server;
pub mod store;
pub mod ws;

#[cfg(test)]
mod testing;

pub use auth::{Identity, JwtManager, TokenVerifier};
pub use config::HubConfig;
pub use error::HubError;
pub use feed::{FeedHandle, QuoteUpdate, UpstreamFeed};
pub use hub::Hub;
pub use server::HubServer;
pub use store::{InMemoryStore, QuoteStore};
pub use ws::{BroadcastFilter, CloseReason, Envelope, WsConfig};
