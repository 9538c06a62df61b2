//! Built-in message handlers.
//!
//! | type | channel | handler |
//! |---|---|---|
//! | `subscription` | `quotes` | [`QuoteSubscriptionHandler`] |
//! | `subscription` | `*` | [`ChannelSubscriptionHandler`] |
//! | `ping` | `*` | [`PingHandler`] |
//! | `pong` | `*` | [`PongHandler`] |

use async_trait::async_trait;
use pulse_core::types::Symbol;
use std::sync::Arc;
use tracing::{debug, warn};

use super::connection::{ConnectionId, ConnectionRegistry};
use super::message::{
    AckBody, AckError, ClientMessage, Envelope, QUOTES_CHANNEL, ServerMessage,
    SubscriptionAction, kinds,
};
use super::multiplexer::SymbolMultiplexer;
use super::router::{MessageHandler, MessageRouter, RouteHandle, WILDCARD};
use crate::error::HandlerError;
use crate::feed::QuoteUpdate;
use crate::hub::INVALID_MESSAGE;
use crate::store::QuoteStore;

fn reply(
    registry: &ConnectionRegistry,
    conn: ConnectionId,
    message: ServerMessage,
) -> Result<(), HandlerError> {
    let envelope = message.into_envelope()?;
    registry.deliver(conn, &envelope)?;
    Ok(())
}

fn unexpected(handler: &str, message: &ClientMessage) -> HandlerError {
    format!("{handler} cannot handle {message:?}").into()
}

/// Symbol subscriptions on the `quotes` channel.
///
/// A connection is a member of the `quotes` channel exactly while it holds at
/// least one symbol.
pub struct QuoteSubscriptionHandler {
    registry: Arc<ConnectionRegistry>,
    multiplexer: Arc<SymbolMultiplexer>,
    store: Arc<dyn QuoteStore>,
    snapshot_on_subscribe: bool,
}

impl QuoteSubscriptionHandler {
    async fn send_snapshot(&self, conn: ConnectionId, symbol: &Symbol) {
        let stored = match self.store.get(&QuoteUpdate::store_key(symbol)).await {
            Ok(Some(value)) => value,
            Ok(None) => return,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Failed to read quote snapshot");
                return;
            }
        };
        let update = match serde_json::from_value::<QuoteUpdate>(stored) {
            Ok(update) => update,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Stored quote is malformed");
                return;
            }
        };
        let snapshot = ServerMessage::Quote {
            update,
            snapshot: true,
        };
        if let Err(e) = reply(&self.registry, conn, snapshot) {
            debug!(conn_id = %conn, symbol = %symbol, error = %e, "Snapshot not delivered");
        }
    }
}

#[async_trait]
impl MessageHandler for QuoteSubscriptionHandler {
    async fn handle(
        &self,
        conn: ConnectionId,
        envelope: &Envelope,
        message: ClientMessage,
    ) -> Result<(), HandlerError> {
        let ClientMessage::Subscription { action, symbols } = message else {
            return Err(unexpected("quote subscription handler", &message));
        };
        let channel = envelope.channel().unwrap_or(QUOTES_CHANNEL).to_string();

        match action {
            SubscriptionAction::Subscribe => {
                let outcome = self.multiplexer.subscribe(conn, &symbols).await;
                if !outcome.symbols.is_empty()
                    && let Err(e) = self.registry.join_channel(conn, QUOTES_CHANNEL)
                {
                    debug!(conn_id = %conn, error = %e, "Could not join quotes channel");
                }

                let body = AckBody::subscribed(outcome.symbol_names(), outcome.ack_errors());
                reply(&self.registry, conn, ServerMessage::Ack { channel, body })?;

                if self.snapshot_on_subscribe {
                    for symbol in &outcome.symbols {
                        self.send_snapshot(conn, symbol).await;
                    }
                }
                Ok(())
            }
            SubscriptionAction::Unsubscribe => {
                let outcome = self.multiplexer.unsubscribe(conn, &symbols).await;
                if self.multiplexer.symbols_of(conn).is_empty() {
                    self.registry.leave_channel(conn, QUOTES_CHANNEL);
                }

                let body = AckBody::unsubscribed(outcome.symbol_names(), outcome.ack_errors());
                reply(&self.registry, conn, ServerMessage::Ack { channel, body })
            }
        }
    }
}

/// Join/leave for any other named channel.
pub struct ChannelSubscriptionHandler {
    registry: Arc<ConnectionRegistry>,
}

#[async_trait]
impl MessageHandler for ChannelSubscriptionHandler {
    async fn handle(
        &self,
        conn: ConnectionId,
        envelope: &Envelope,
        message: ClientMessage,
    ) -> Result<(), HandlerError> {
        let ClientMessage::Subscription { action, .. } = message else {
            return Err(unexpected("channel subscription handler", &message));
        };
        let Some(channel) = envelope.channel() else {
            let error = ServerMessage::error(INVALID_MESSAGE, "subscription requires a channel");
            return reply(&self.registry, conn, error);
        };

        let body = match action {
            SubscriptionAction::Subscribe => match self.registry.join_channel(conn, channel) {
                Ok(()) => AckBody::subscribed(vec![channel.to_string()], Vec::new()),
                Err(e) => AckBody::subscribed(
                    Vec::new(),
                    vec![AckError {
                        symbol: channel.to_string(),
                        error: e.reason().to_string(),
                    }],
                ),
            },
            SubscriptionAction::Unsubscribe => {
                self.registry.leave_channel(conn, channel);
                AckBody::unsubscribed(vec![channel.to_string()], Vec::new())
            }
        };

        reply(
            &self.registry,
            conn,
            ServerMessage::Ack {
                channel: channel.to_string(),
                body,
            },
        )
    }
}

/// Answers client pings.
pub struct PingHandler {
    registry: Arc<ConnectionRegistry>,
}

#[async_trait]
impl MessageHandler for PingHandler {
    async fn handle(
        &self,
        conn: ConnectionId,
        _envelope: &Envelope,
        _message: ClientMessage,
    ) -> Result<(), HandlerError> {
        reply(&self.registry, conn, ServerMessage::Pong)
    }
}

/// Records pong replies to server pings.
pub struct PongHandler {
    registry: Arc<ConnectionRegistry>,
}

#[async_trait]
impl MessageHandler for PongHandler {
    async fn handle(
        &self,
        conn: ConnectionId,
        _envelope: &Envelope,
        _message: ClientMessage,
    ) -> Result<(), HandlerError> {
        self.registry.record_pong(conn);
        Ok(())
    }
}

/// Registers the built-in handlers on `router`.
pub fn register_defaults(
    router: &MessageRouter,
    registry: &Arc<ConnectionRegistry>,
    multiplexer: &Arc<SymbolMultiplexer>,
    store: &Arc<dyn QuoteStore>,
    snapshot_on_subscribe: bool,
) -> Vec<RouteHandle> {
    vec![
        router.register(
            kinds::SUBSCRIPTION,
            QUOTES_CHANNEL,
            Arc::new(QuoteSubscriptionHandler {
                registry: registry.clone(),
                multiplexer: multiplexer.clone(),
                store: store.clone(),
                snapshot_on_subscribe,
            }),
        ),
        router.register(
            kinds::SUBSCRIPTION,
            WILDCARD,
            Arc::new(ChannelSubscriptionHandler {
                registry: registry.clone(),
            }),
        ),
        router.register(
            kinds::PING,
            WILDCARD,
            Arc::new(PingHandler {
                registry: registry.clone(),
            }),
        ),
        router.register(
            kinds::PONG,
            WILDCARD,
            Arc::new(PongHandler {
                registry: registry.clone(),
            }),
        ),
    ]
}
