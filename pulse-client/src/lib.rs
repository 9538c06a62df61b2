//! # Pulse Client
//!
//! Reconnecting client for the Pulse hub.
//!
//! Subscriptions are kept as intents that outlive any single connection.
//! After every admission the client replays the intents marked for
//! auto-resubscribe, so a dropped connection never loses what the caller
//! asked for. Credential rejections are terminal; every other drop is
//! retried with capped exponential backoff.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod config;
mod error;
mod intent;
mod message;
mod state;

pub use client::{HubCallback, HubClient, Submission};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::ClientError;
pub use intent::{DesiredState, IntentStore, SubscriptionIntent};
pub use message::{Envelope, MessageCodec, QUOTES_CHANNEL};
pub use state::{ClientState, ClientStatus};
