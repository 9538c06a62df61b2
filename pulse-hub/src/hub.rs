//! The hub instance.
//!
//! A [`Hub`] owns every registry and the collaborators injected at
//! construction. The composing service holds it in an `Arc`; tests build a
//! fresh one each.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::auth::{self, Identity, TokenVerifier};
use crate::error::{AuthError, RoutingError};
use crate::feed::{QuoteUpdate, UpstreamFeed};
use crate::store::QuoteStore;
use crate::ws::broadcaster::{BroadcastFilter, BroadcastReport, Broadcaster};
use crate::ws::config::WsConfig;
use crate::ws::connection::{Admission, ConnectionId, ConnectionRegistry};
use crate::ws::dispatch;
use crate::ws::message::{CloseReason, Envelope, ServerMessage};
use crate::ws::multiplexer::SymbolMultiplexer;
use crate::ws::router::{MessageRouter, RouteHandle};

/// Error code sent for envelopes that cannot be parsed or decoded.
pub const INVALID_MESSAGE: &str = "INVALID_MESSAGE";

/// Real-time distribution hub.
pub struct Hub {
    config: WsConfig,
    verifier: Arc<dyn TokenVerifier>,
    registry: Arc<ConnectionRegistry>,
    multiplexer: Arc<SymbolMultiplexer>,
    router: Arc<MessageRouter>,
    broadcaster: Broadcaster,
    store: Arc<dyn QuoteStore>,
    started_at: Instant,
    routes: Mutex<Vec<RouteHandle>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("registry", &self.registry)
            .field("multiplexer", &self.multiplexer)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

impl Hub {
    /// Builds a hub over the given collaborators and registers the built-in
    /// message handlers.
    #[must_use]
    pub fn new(
        config: WsConfig,
        verifier: Arc<dyn TokenVerifier>,
        feed: Arc<dyn UpstreamFeed>,
        store: Arc<dyn QuoteStore>,
    ) -> Arc<Self> {
        let multiplexer = Arc::new(SymbolMultiplexer::new(
            feed,
            config.max_symbols_per_connection,
        ));
        let registry =
            Arc::new(ConnectionRegistry::new(&config).with_observer(multiplexer.clone()));
        let router = Arc::new(MessageRouter::new());
        let routes = dispatch::register_defaults(
            &router,
            &registry,
            &multiplexer,
            &store,
            config.snapshot_on_subscribe,
        );

        Arc::new(Self {
            broadcaster: Broadcaster::new(registry.clone()),
            config,
            verifier,
            registry,
            multiplexer,
            router,
            store,
            started_at: Instant::now(),
            routes: Mutex::new(routes),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawns the heartbeat loop and the quote pump.
    ///
    /// Both tasks hold only a weak reference and stop once the hub is dropped
    /// or [`shutdown`](Self::shutdown) runs.
    pub fn start(self: &Arc<Self>, mut quotes: mpsc::Receiver<QuoteUpdate>) {
        let weak = Arc::downgrade(self);
        let period = self.config.ping_interval();
        let heartbeat = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(hub) = weak.upgrade() else {
                    break;
                };
                let reaped = hub.heartbeat_tick().await;
                if reaped > 0 {
                    debug!(reaped, "Heartbeat reaped connections");
                }
            }
        });

        let weak = Arc::downgrade(self);
        let pump = tokio::spawn(async move {
            while let Some(update) = quotes.recv().await {
                let Some(hub) = weak.upgrade() else {
                    break;
                };
                hub.publish_quote(update).await;
            }
            debug!("Quote stream ended");
        });

        self.tasks.lock().extend([heartbeat, pump]);
        info!(
            ping_interval_secs = self.config.ping_interval_secs,
            pong_timeout_secs = self.config.pong_timeout_secs,
            "Hub started"
        );
    }

    /// Runs the auth gate for a connection attempt.
    pub async fn authenticate(&self, credential: Option<&str>) -> Result<Option<Identity>, AuthError> {
        auth::authenticate(
            self.verifier.as_ref(),
            credential,
            self.config.allow_anonymous,
        )
        .await
    }

    /// Admits a connection and queues its `connect` envelope.
    pub fn admit(&self, identity: Option<Identity>) -> Admission {
        let admission = self.registry.admit(identity.clone());
        let connect = ServerMessage::Connect {
            connection_id: admission.id.to_string(),
            identity,
        };
        self.send(admission.id, connect);
        admission
    }

    /// Removes a connection with full cleanup.
    pub async fn remove(&self, id: ConnectionId, reason: CloseReason) -> bool {
        self.registry.remove(id, reason).await
    }

    /// Handles one inbound text frame.
    ///
    /// Nothing here closes the connection: unparseable envelopes and bad
    /// payloads are answered with an error envelope, unroutable ones are
    /// dropped, and handler failures are logged.
    pub async fn handle_text(&self, id: ConnectionId, text: &str) {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(conn_id = %id, error = %e, "Malformed envelope");
                self.send(
                    id,
                    ServerMessage::error(INVALID_MESSAGE, format!("malformed envelope: {e}")),
                );
                return;
            }
        };

        match self.router.dispatch(id, &envelope).await {
            Ok(()) => {}
            Err(e @ RoutingError::Unroutable { .. }) => {
                debug!(conn_id = %id, error = %e, "Dropping unroutable envelope");
            }
            Err(e @ RoutingError::InvalidPayload { .. }) => {
                warn!(conn_id = %id, error = %e, "Rejected envelope");
                self.send(id, ServerMessage::error(INVALID_MESSAGE, e.to_string()));
            }
            Err(e @ RoutingError::HandlerFailed { .. }) => {
                warn!(conn_id = %id, error = %e, "Handler failed");
            }
        }
    }

    /// Fans `envelope` out to every open connection matching `filter`.
    pub fn broadcast(&self, envelope: &Envelope, filter: &BroadcastFilter) -> BroadcastReport {
        self.broadcaster.broadcast(envelope, filter)
    }

    /// Stores the latest quote and delivers it to the symbol's subscribers.
    pub async fn publish_quote(&self, update: QuoteUpdate) -> BroadcastReport {
        let key = QuoteUpdate::store_key(&update.symbol);
        match serde_json::to_value(&update) {
            Ok(value) => {
                if let Err(e) = self.store.put(&key, value).await {
                    warn!(key = %key, error = %e, "Failed to store quote");
                }
            }
            Err(e) => warn!(key = %key, error = %e, "Failed to serialize quote"),
        }

        let targets = self.multiplexer.subscribers(&update.symbol).await;
        if targets.is_empty() {
            return BroadcastReport::default();
        }

        let quote = ServerMessage::Quote {
            update,
            snapshot: false,
        };
        match quote.into_envelope() {
            Ok(envelope) => self.broadcaster.deliver(&envelope, &targets),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to build quote envelope");
                BroadcastReport::default()
            }
        }
    }

    /// Runs one heartbeat pass. Returns the number of reaped connections.
    pub async fn heartbeat_tick(&self) -> usize {
        self.registry.heartbeat_tick(self.config.pong_timeout()).await
    }

    /// Closes every connection with `server_shutdown` and stops background tasks.
    pub async fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        let removed = self
            .registry
            .remove_all(CloseReason::ServerShutdown)
            .await;
        info!(
            removed,
            upstream = self.multiplexer.upstream_count(),
            "Hub shut down"
        );
    }

    /// Unregisters the built-in handlers. Custom routes stay in place.
    pub fn remove_default_routes(&self) -> usize {
        let handles: Vec<RouteHandle> = self.routes.lock().drain(..).collect();
        handles
            .into_iter()
            .map(|handle| self.router.unregister(handle))
            .filter(|removed| *removed)
            .count()
    }

    /// Hub configuration.
    #[must_use]
    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    /// Connection registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Symbol multiplexer.
    #[must_use]
    pub fn multiplexer(&self) -> &Arc<SymbolMultiplexer> {
        &self.multiplexer
    }

    /// Message router. Custom handlers register here.
    #[must_use]
    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }

    /// Number of open upstream subscriptions.
    #[must_use]
    pub fn upstream_count(&self) -> usize {
        self.multiplexer.upstream_count()
    }

    /// Time since the hub was built.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn send(&self, id: ConnectionId, message: ServerMessage) {
        let envelope = match message.into_envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(conn_id = %id, error = %e, "Failed to build envelope");
                return;
            }
        };
        if let Err(e) = self.registry.deliver(id, &envelope) {
            debug!(conn_id = %id, kind = %envelope.kind, error = %e, "Envelope not delivered");
        }
    }
}
