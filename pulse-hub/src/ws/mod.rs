//! WebSocket server module.
//!
//! This module provides the real-time side of the hub:
//! - Connection admission, channel membership and heartbeat reaping
//! - Per-symbol multiplexing of upstream feed subscriptions
//! - Envelope routing to registered handlers
//! - Fan-out to filtered sets of connections
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        WebSocket Hub                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐         │
//! │  │ Connection  │  │ Connection  │  │ Connection  │  ...    │
//! │  │  conn-1     │  │  conn-2     │  │  conn-3     │         │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘         │
//! │         │ inbound        │                │                 │
//! │         ▼                ▼                ▼                 │
//! │  ┌───────────────────────────────────────────────────────┐ │
//! │  │                  Message Router                        │ │
//! │  │  (type, channel) → handler, wildcard fallback          │ │
//! │  └───────────────────────────────────────────────────────┘ │
//! │         │ subscription                                      │
//! │         ▼                                                   │
//! │  ┌───────────────────────────────────────────────────────┐ │
//! │  │                 Symbol Multiplexer                     │ │
//! │  │  one upstream subscription per symbol, refcounted      │ │
//! │  └───────────────────────────────────────────────────────┘ │
//! │         ▲ quotes                                            │
//! │  ┌──────┴────────────────────────────────────────────────┐ │
//! │  │                    Broadcaster                         │ │
//! │  │  channel / user filters, non-blocking queues           │ │
//! │  └───────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Authentication
//!
//! The credential is read once, before admission, from either:
//! - Query parameter: `ws://host/ws?token=<jwt>`
//! - Header: `Authorization: Bearer <jwt>`
//!
//! # Example Client Usage
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:8080/ws?token=<jwt>');
//!
//! ws.onopen = () => {
//!     ws.send(JSON.stringify({
//!         type: 'subscription',
//!         channel: 'quotes',
//!         data: { action: 'subscribe', symbols: ['AAPL', 'MSFT'] }
//!     }));
//! };
//!
//! ws.onmessage = (event) => {
//!     const msg = JSON.parse(event.data);
//!     if (msg.type === 'ping') {
//!         ws.send(JSON.stringify({ type: 'pong' }));
//!     }
//! };
//! ```

pub mod broadcaster;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod handler;
pub mod message;
pub mod multiplexer;
pub mod router;

pub use broadcaster::{BroadcastFilter, BroadcastReport, Broadcaster};
pub use config::WsConfig;
pub use connection::{Admission, ConnectionId, ConnectionInfo, ConnectionPhase, ConnectionRegistry};
pub use handler::ws_handler;
pub use message::{ClientMessage, CloseReason, Envelope, ServerMessage};
pub use multiplexer::{SubscriptionOutcome, SymbolMultiplexer};
pub use router::{MessageHandler, MessageRouter, RouteHandle};
