//! Inbound message router.
//!
//! Handlers are registered for a `(type, channel)` pair where either part may
//! be `*`. An envelope resolves to the exact pair first, then `(type, *)`,
//! then `(*, *)`. Registering returns a [`RouteHandle`]; the route stays
//! active until that handle is passed to [`MessageRouter::unregister`]. When
//! several handlers share a key, the most recent registration wins.

use async_trait::async_trait;
use dashmap::DashMap;
use pulse_telemetry::metrics::PulseMetrics;
use pulse_telemetry::spans::dispatch_span;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::Instrument;

use super::connection::ConnectionId;
use super::message::{ClientMessage, Envelope};
use crate::error::{HandlerError, RoutingError};

/// Matches any type or any channel.
pub const WILDCARD: &str = "*";

/// Handles one kind of inbound message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles a decoded message from `conn`.
    async fn handle(
        &self,
        conn: ConnectionId,
        envelope: &Envelope,
        message: ClientMessage,
    ) -> Result<(), HandlerError>;
}

type RouteKey = (String, String);

/// Registration token. Pass it to [`MessageRouter::unregister`] to remove the route.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping the handle leaves no way to unregister the route"]
pub struct RouteHandle {
    key: RouteKey,
    id: u64,
}

impl RouteHandle {
    /// Envelope type the route was registered for.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.key.0
    }

    /// Channel the route was registered for.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.key.1
    }
}

/// Dispatches inbound envelopes to registered handlers.
#[derive(Default)]
pub struct MessageRouter {
    routes: DashMap<RouteKey, Vec<(u64, Arc<dyn MessageHandler>)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("routes", &self.routes.len())
            .finish_non_exhaustive()
    }
}

impl MessageRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `(kind, channel)`.
    pub fn register(
        &self,
        kind: impl Into<String>,
        channel: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> RouteHandle {
        let key = (kind.into(), channel.into());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.routes
            .entry(key.clone())
            .or_default()
            .push((id, handler));
        RouteHandle { key, id }
    }

    /// Removes a route. Returns false if it was already gone.
    pub fn unregister(&self, handle: RouteHandle) -> bool {
        let removed = match self.routes.get_mut(&handle.key) {
            Some(mut stack) => {
                let before = stack.len();
                stack.retain(|(id, _)| *id != handle.id);
                stack.len() != before
            }
            None => false,
        };
        self.routes.remove_if(&handle.key, |_, stack| stack.is_empty());
        removed
    }

    /// Number of registered keys.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Dispatches `envelope` from `conn`.
    ///
    /// Handler failures are returned to the caller; the connection is not
    /// affected by them.
    pub async fn dispatch(&self, conn: ConnectionId, envelope: &Envelope) -> Result<(), RoutingError> {
        let span = dispatch_span(&conn.to_string(), &envelope.kind, envelope.channel());
        self.dispatch_inner(conn, envelope).instrument(span).await
    }

    async fn dispatch_inner(
        &self,
        conn: ConnectionId,
        envelope: &Envelope,
    ) -> Result<(), RoutingError> {
        let kind = envelope.kind.as_str();
        let message =
            ClientMessage::try_from(envelope).map_err(|e| RoutingError::InvalidPayload {
                kind: kind.to_string(),
                reason: e.to_string(),
            })?;

        let Some(handler) = self.resolve(kind, envelope.channel()) else {
            PulseMetrics::dispatch_unroutable(kind);
            return Err(RoutingError::Unroutable {
                kind: kind.to_string(),
                channel: envelope.channel.clone(),
            });
        };

        let started = Instant::now();
        let result = handler.handle(conn, envelope, message).await;
        PulseMetrics::dispatch_latency(kind, started.elapsed().as_secs_f64());

        result.map_err(|source| {
            PulseMetrics::dispatch_handler_error(kind);
            RoutingError::HandlerFailed {
                kind: kind.to_string(),
                source,
            }
        })
    }

    fn resolve(&self, kind: &str, channel: Option<&str>) -> Option<Arc<dyn MessageHandler>> {
        let mut keys = Vec::with_capacity(3);
        if let Some(channel) = channel {
            keys.push((kind.to_string(), channel.to_string()));
        }
        keys.push((kind.to_string(), WILDCARD.to_string()));
        keys.push((WILDCARD.to_string(), WILDCARD.to_string()));

        keys.into_iter().find_map(|key| {
            self.routes
                .get(&key)
                .and_then(|stack| stack.last().map(|(_, handler)| handler.clone()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    struct Recorder {
        name: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle(
            &self,
            _conn: ConnectionId,
            _envelope: &Envelope,
            _message: ClientMessage,
        ) -> Result<(), HandlerError> {
            self.seen.lock().push(self.name);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl MessageHandler for Failing {
        async fn handle(
            &self,
            _conn: ConnectionId,
            _envelope: &Envelope,
            _message: ClientMessage,
        ) -> Result<(), HandlerError> {
            Err("boom".into())
        }
    }

    fn recorder(name: &'static str, seen: &Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn MessageHandler> {
        Arc::new(Recorder {
            name,
            seen: seen.clone(),
        })
    }

    fn envelope(kind: &str, channel: Option<&str>) -> Envelope {
        Envelope::new(kind, channel.map(String::from), json!({}))
    }

    #[tokio::test]
    async fn test_resolution_order() {
        let router = MessageRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let conn = ConnectionId::generate();

        let _exact = router.register("chat", "room-1", recorder("exact", &seen));
        let _typed = router.register("chat", WILDCARD, recorder("typed", &seen));
        let _global = router.register(WILDCARD, WILDCARD, recorder("global", &seen));

        router.dispatch(conn, &envelope("chat", Some("room-1"))).await.unwrap();
        router.dispatch(conn, &envelope("chat", Some("room-2"))).await.unwrap();
        router.dispatch(conn, &envelope("chat", None)).await.unwrap();
        router.dispatch(conn, &envelope("typing", Some("room-1"))).await.unwrap();

        assert_eq!(*seen.lock(), vec!["exact", "typed", "typed", "global"]);
    }

    #[tokio::test]
    async fn test_unroutable() {
        let router = MessageRouter::new();
        let err = router
            .dispatch(ConnectionId::generate(), &envelope("chat", Some("room")))
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::Unroutable { ref kind, .. } if kind == "chat"));
    }

    #[tokio::test]
    async fn test_invalid_payload_is_rejected_before_handler() {
        let router = MessageRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _route = router.register("subscription", WILDCARD, recorder("sub", &seen));

        let bad = Envelope::new("subscription", Some("quotes".into()), json!({"symbols": 5}));
        let err = router.dispatch(ConnectionId::generate(), &bad).await.unwrap_err();

        assert!(matches!(err, RoutingError::InvalidPayload { .. }));
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_handler_failure_is_surfaced() {
        let router = MessageRouter::new();
        let _route = router.register("chat", WILDCARD, Arc::new(Failing));

        let err = router
            .dispatch(ConnectionId::generate(), &envelope("chat", None))
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::HandlerFailed { .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_latest_registration_wins_and_unregister_restores() {
        let router = MessageRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let conn = ConnectionId::generate();

        let first = router.register("chat", WILDCARD, recorder("first", &seen));
        let second = router.register("chat", WILDCARD, recorder("second", &seen));
        assert_eq!(second.kind(), "chat");

        router.dispatch(conn, &envelope("chat", None)).await.unwrap();
        assert!(router.unregister(second));
        router.dispatch(conn, &envelope("chat", None)).await.unwrap();
        assert_eq!(*seen.lock(), vec!["second", "first"]);

        assert!(router.unregister(first));
        assert_eq!(router.route_count(), 0);
        assert!(router.dispatch(conn, &envelope("chat", None)).await.is_err());
    }

    #[test]
    fn test_unregister_twice() {
        let router = MessageRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handle = router.register("chat", WILDCARD, recorder("a", &seen));
        let copy = RouteHandle {
            key: handle.key.clone(),
            id: handle.id,
        };

        assert!(router.unregister(handle));
        assert!(!router.unregister(copy));
    }
}
