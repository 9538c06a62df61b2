//! WebSocket connection management.
//!
//! This module provides connection state tracking and management including:
//! - Connection lifecycle (`Connecting -> Open -> Closing -> Closed`)
//! - Generic channel membership, with user-scoped channels
//! - Heartbeat tracking and reaping of dead or degraded connections
//! - Non-blocking delivery into per-connection outbound queues
//!
//! Lock order is connection map shard, then a connection's own lock, then a
//! channel map shard. Nothing takes a connection lock while holding a channel
//! map reference.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use pulse_telemetry::metrics::PulseMetrics;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::broadcaster::BroadcastFilter;
use super::config::WsConfig;
use super::message::{CloseReason, Envelope, ServerMessage};
use crate::auth::Identity;
use crate::error::{ChannelError, DeliveryError};

const MAX_CHANNEL_NAME_LEN: usize = 128;

/// Unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generates a new unique connection ID.
    pub fn generate() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the inner ID value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle phase of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    /// Record created, admission in progress
    Connecting,
    /// Admitted and serving traffic
    Open,
    /// Cleanup running
    Closing,
    /// Gone
    Closed,
}

/// Record of a single connection. Owned by the registry.
#[derive(Debug)]
struct Connection {
    id: ConnectionId,
    identity: Option<Identity>,
    phase: ConnectionPhase,
    channels: HashSet<String>,
    last_heartbeat: Instant,
    awaiting_pong: bool,
    consecutive_failures: u32,
    degraded: bool,
    sender: mpsc::Sender<Envelope>,
    closer: Option<oneshot::Sender<CloseReason>>,
    connected_at: Instant,
}

impl Connection {
    fn user_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.user_id.as_str())
    }

    fn info(&self) -> ConnectionInfo {
        let mut channels: Vec<String> = self.channels.iter().cloned().collect();
        channels.sort();
        ConnectionInfo {
            id: self.id,
            identity: self.identity.clone(),
            phase: self.phase,
            channels,
            degraded: self.degraded,
            connected_for: self.connected_at.elapsed(),
        }
    }

    /// Queues `envelope` without waiting. Repeated rejections degrade the
    /// connection so the next heartbeat tick reaps it.
    fn push(&mut self, envelope: Envelope, threshold: u32) -> Result<(), DeliveryError> {
        match self.sender.try_send(envelope) {
            Ok(()) => {
                self.consecutive_failures = 0;
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= threshold && !self.degraded {
                    warn!(
                        conn_id = %self.id,
                        failures = self.consecutive_failures,
                        "Outbound queue keeps rejecting, marking connection degraded"
                    );
                    self.degraded = true;
                }
                Err(DeliveryError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                self.degraded = true;
                Err(DeliveryError::Closed)
            }
        }
    }
}

/// Point-in-time view of a connection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    /// Connection id
    #[serde(serialize_with = "serialize_id")]
    pub id: ConnectionId,
    /// Identity, absent for anonymous connections
    pub identity: Option<Identity>,
    /// Lifecycle phase
    pub phase: ConnectionPhase,
    /// Joined channels, sorted
    pub channels: Vec<String>,
    /// Marked for reaping after repeated delivery failures
    pub degraded: bool,
    /// Time since admission
    #[serde(skip)]
    pub connected_for: Duration,
}

fn serialize_id<S: serde::Serializer>(id: &ConnectionId, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(id)
}

/// Result of admitting a connection. The socket task owns both receivers.
#[derive(Debug)]
pub struct Admission {
    /// Assigned id
    pub id: ConnectionId,
    /// Envelopes to write to the socket
    pub outbound: mpsc::Receiver<Envelope>,
    /// Fires once, when the registry removes the connection
    pub close: oneshot::Receiver<CloseReason>,
}

/// Hook into connection lifecycle.
#[async_trait]
pub trait ConnectionObserver: Send + Sync {
    /// Called after the record is created, before it is open.
    fn on_admitted(&self, id: ConnectionId);

    /// Called during cleanup, after channel memberships are gone.
    async fn on_removed(&self, id: ConnectionId);
}

/// Registry of all live WebSocket connections.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<RwLock<Connection>>>,
    channels: DashMap<String, HashSet<ConnectionId>>,
    observers: Vec<Arc<dyn ConnectionObserver>>,
    max_queue_size: usize,
    user_channel_prefix: String,
    delivery_failure_threshold: u32,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.connections.len())
            .field("channels", &self.channels.len())
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl ConnectionRegistry {
    /// Creates a new connection registry.
    #[must_use]
    pub fn new(config: &WsConfig) -> Self {
        Self {
            connections: DashMap::new(),
            channels: DashMap::new(),
            observers: Vec::new(),
            max_queue_size: config.max_queue_size.max(1),
            user_channel_prefix: config.user_channel_prefix.clone(),
            delivery_failure_threshold: config.delivery_failure_threshold.max(1),
        }
    }

    /// Adds a lifecycle observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ConnectionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Admits a connection and starts heartbeat tracking for it.
    pub fn admit(&self, identity: Option<Identity>) -> Admission {
        let id = ConnectionId::generate();
        let (sender, outbound) = mpsc::channel(self.max_queue_size);
        let (closer, close) = oneshot::channel();
        let now = Instant::now();
        let authenticated = identity.is_some();

        let record = Arc::new(RwLock::new(Connection {
            id,
            identity,
            phase: ConnectionPhase::Connecting,
            channels: HashSet::new(),
            last_heartbeat: now,
            awaiting_pong: false,
            consecutive_failures: 0,
            degraded: false,
            sender,
            closer: Some(closer),
            connected_at: now,
        }));
        self.connections.insert(id, record.clone());

        for observer in &self.observers {
            observer.on_admitted(id);
        }
        record.write().phase = ConnectionPhase::Open;

        PulseMetrics::connection_opened(authenticated);
        debug!(conn_id = %id, authenticated, "Connection admitted");

        Admission {
            id,
            outbound,
            close,
        }
    }

    /// Removes a connection from every registry and signals its socket task.
    ///
    /// Returns false if the connection was unknown or already being removed.
    pub async fn remove(&self, id: ConnectionId, reason: CloseReason) -> bool {
        let Some(record) = self.record(id) else {
            return false;
        };

        let (channels, closer) = {
            let mut conn = record.write();
            match conn.phase {
                ConnectionPhase::Connecting | ConnectionPhase::Open => {}
                ConnectionPhase::Closing | ConnectionPhase::Closed => return false,
            }
            conn.phase = ConnectionPhase::Closing;
            (std::mem::take(&mut conn.channels), conn.closer.take())
        };

        for channel in &channels {
            self.detach(channel, id);
        }
        for observer in &self.observers {
            observer.on_removed(id).await;
        }
        if let Some(closer) = closer {
            // The socket task may already be gone.
            let _ = closer.send(reason);
        }

        record.write().phase = ConnectionPhase::Closed;
        self.connections.remove(&id);

        PulseMetrics::connection_closed(reason.as_str());
        info!(conn_id = %id, reason = %reason, "Connection removed");
        true
    }

    /// Removes every connection. Returns how many were removed.
    pub async fn remove_all(&self, reason: CloseReason) -> usize {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|e| *e.key()).collect();
        let mut removed = 0;
        for id in ids {
            if self.remove(id, reason).await {
                removed += 1;
            }
        }
        removed
    }

    /// Runs one heartbeat pass.
    ///
    /// Connections that stayed silent for longer than `pong_timeout` after a
    /// ping, and connections marked degraded, are removed. Every other open
    /// connection gets a ping. Returns the number of removed connections.
    pub async fn heartbeat_tick(&self, pong_timeout: Duration) -> usize {
        let ping = match ServerMessage::Ping.into_envelope() {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                warn!(error = %e, "Failed to build ping envelope");
                None
            }
        };
        let threshold = self.delivery_failure_threshold;

        let mut reap = Vec::new();
        for entry in self.connections.iter() {
            let mut conn = entry.value().write();
            if conn.phase != ConnectionPhase::Open {
                continue;
            }
            if conn.degraded {
                reap.push((conn.id, CloseReason::DeliveryFailed));
                continue;
            }
            if conn.awaiting_pong && conn.last_heartbeat.elapsed() > pong_timeout {
                reap.push((conn.id, CloseReason::HeartbeatTimeout));
                continue;
            }
            if let Some(ping) = &ping
                && conn.push(ping.clone(), threshold).is_ok()
            {
                conn.awaiting_pong = true;
            }
        }

        let mut removed = 0;
        for (id, reason) in reap {
            if self.remove(id, reason).await {
                removed += 1;
            }
        }
        removed
    }

    /// Records a pong from the client.
    pub fn record_pong(&self, id: ConnectionId) {
        if let Some(record) = self.record(id) {
            let mut conn = record.write();
            conn.last_heartbeat = Instant::now();
            conn.awaiting_pong = false;
        }
    }

    /// Joins a generic channel.
    ///
    /// Channels under the user prefix are only open to their owner: the
    /// channel must be `<prefix><userId>` or start with `<prefix><userId>:`.
    pub fn join_channel(&self, id: ConnectionId, channel: &str) -> Result<(), ChannelError> {
        validate_channel_name(channel)?;
        let record = self.record(id).ok_or(ChannelError::NotOpen)?;

        let mut conn = record.write();
        if conn.phase != ConnectionPhase::Open {
            return Err(ChannelError::NotOpen);
        }
        self.check_scope(conn.identity.as_ref(), channel)?;

        if conn.channels.insert(channel.to_string()) {
            self.channels
                .entry(channel.to_string())
                .or_default()
                .insert(id);
            debug!(conn_id = %id, channel, "Joined channel");
        }
        Ok(())
    }

    /// Leaves a generic channel. Returns false if the connection was not a member.
    pub fn leave_channel(&self, id: ConnectionId, channel: &str) -> bool {
        let Some(record) = self.record(id) else {
            return false;
        };
        let left = record.write().channels.remove(channel);
        if left {
            self.detach(channel, id);
            debug!(conn_id = %id, channel, "Left channel");
        }
        left
    }

    /// Returns true if the connection is a member of `channel`.
    #[must_use]
    pub fn is_member(&self, id: ConnectionId, channel: &str) -> bool {
        self.channels
            .get(channel)
            .is_some_and(|members| members.contains(&id))
    }

    /// Members of `channel`.
    #[must_use]
    pub fn channel_members(&self, channel: &str) -> Vec<ConnectionId> {
        self.channels
            .get(channel)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of channels with at least one member.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Open connections matching `filter`.
    ///
    /// The channel and user filters intersect; with neither, every open
    /// connection matches.
    #[must_use]
    pub fn targets(&self, filter: &BroadcastFilter) -> Vec<ConnectionId> {
        let candidates = match filter.channel.as_deref() {
            Some(channel) => self.channel_members(channel),
            None => self.connections.iter().map(|e| *e.key()).collect(),
        };

        candidates
            .into_iter()
            .filter(|id| {
                self.record(*id).is_some_and(|record| {
                    let conn = record.read();
                    conn.phase == ConnectionPhase::Open
                        && filter
                            .user_id
                            .as_deref()
                            .is_none_or(|user| conn.user_id() == Some(user))
                })
            })
            .collect()
    }

    /// Queues an envelope for one connection without waiting.
    pub fn deliver(&self, id: ConnectionId, envelope: &Envelope) -> Result<(), DeliveryError> {
        let record = self.record(id).ok_or(DeliveryError::Closed)?;
        let mut conn = record.write();
        if conn.phase != ConnectionPhase::Open {
            return Err(DeliveryError::Closed);
        }
        conn.push(envelope.clone(), self.delivery_failure_threshold)
    }

    /// Snapshot of one connection.
    #[must_use]
    pub fn connection(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.record(id).map(|record| record.read().info())
    }

    /// Identity of a connection, `None` if unknown or anonymous.
    #[must_use]
    pub fn identity(&self, id: ConnectionId) -> Option<Identity> {
        self.record(id).and_then(|record| record.read().identity.clone())
    }

    /// Open connections belonging to `user_id`.
    #[must_use]
    pub fn user_connections(&self, user_id: &str) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> = self
            .connections
            .iter()
            .filter_map(|entry| {
                let conn = entry.value().read();
                (conn.phase == ConnectionPhase::Open && conn.user_id() == Some(user_id))
                    .then(|| conn.info())
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Returns the number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn record(&self, id: ConnectionId) -> Option<Arc<RwLock<Connection>>> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    fn detach(&self, channel: &str, id: ConnectionId) {
        if let Some(mut members) = self.channels.get_mut(channel) {
            members.remove(&id);
        }
        self.channels.remove_if(channel, |_, members| members.is_empty());
    }

    fn check_scope(&self, identity: Option<&Identity>, channel: &str) -> Result<(), ChannelError> {
        let Some(owner) = channel.strip_prefix(self.user_channel_prefix.as_str()) else {
            return Ok(());
        };
        let owned = identity.is_some_and(|identity| {
            owner == identity.user_id
                || owner
                    .strip_prefix(identity.user_id.as_str())
                    .is_some_and(|rest| rest.starts_with(':'))
        });
        if owned {
            Ok(())
        } else {
            Err(ChannelError::UserScoped(channel.to_string()))
        }
    }
}

fn validate_channel_name(channel: &str) -> Result<(), ChannelError> {
    if channel.is_empty()
        || channel.len() > MAX_CHANNEL_NAME_LEN
        || channel.chars().any(char::is_whitespace)
    {
        return Err(ChannelError::InvalidName(channel.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(&WsConfig::default())
    }

    fn user(id: &str) -> Option<Identity> {
        Some(Identity {
            user_id: id.to_string(),
            roles: Vec::new(),
        })
    }

    #[derive(Default)]
    struct RecordingObserver {
        admitted: Mutex<Vec<ConnectionId>>,
        removed: Mutex<Vec<ConnectionId>>,
    }

    #[async_trait]
    impl ConnectionObserver for RecordingObserver {
        fn on_admitted(&self, id: ConnectionId) {
            self.admitted.lock().push(id);
        }

        async fn on_removed(&self, id: ConnectionId) {
            self.removed.lock().push(id);
        }
    }

    #[tokio::test]
    async fn test_admit_and_remove() {
        let observer = Arc::new(RecordingObserver::default());
        let registry = registry().with_observer(observer.clone());

        let admission = registry.admit(user("u1"));
        assert_eq!(registry.connection_count(), 1);
        assert_eq!(
            registry.connection(admission.id).map(|c| c.phase),
            Some(ConnectionPhase::Open)
        );
        assert_eq!(*observer.admitted.lock(), vec![admission.id]);

        assert!(registry.remove(admission.id, CloseReason::Normal).await);
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(*observer.removed.lock(), vec![admission.id]);
        assert_eq!(admission.close.await.unwrap(), CloseReason::Normal);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let observer = Arc::new(RecordingObserver::default());
        let registry = registry().with_observer(observer.clone());
        let admission = registry.admit(None);

        assert!(registry.remove(admission.id, CloseReason::Normal).await);
        assert!(!registry.remove(admission.id, CloseReason::ProtocolError).await);
        assert_eq!(observer.removed.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_clears_channel_memberships() {
        let registry = registry();
        let a = registry.admit(user("u1"));
        let b = registry.admit(None);

        registry.join_channel(a.id, "news").unwrap();
        registry.join_channel(a.id, "user:u1").unwrap();
        registry.join_channel(b.id, "news").unwrap();

        registry.remove(a.id, CloseReason::Normal).await;

        assert!(!registry.is_member(a.id, "news"));
        assert!(registry.channel_members("user:u1").is_empty());
        assert_eq!(registry.channel_members("news"), vec![b.id]);
        assert_eq!(registry.channel_count(), 1);
    }

    #[tokio::test]
    async fn test_user_scoped_channels() {
        let registry = registry();
        let anon = registry.admit(None);
        let alice = registry.admit(user("alice"));

        assert!(matches!(
            registry.join_channel(anon.id, "user:alice"),
            Err(ChannelError::UserScoped(_))
        ));
        assert!(registry.join_channel(alice.id, "user:alice").is_ok());
        assert!(registry.join_channel(alice.id, "user:alice:orders").is_ok());
        assert!(registry.join_channel(alice.id, "user:bob").is_err());
        assert!(registry.join_channel(alice.id, "user:alicexyz").is_err());

        // Public channels stay open to anonymous connections.
        assert!(registry.join_channel(anon.id, "news").is_ok());
    }

    #[test]
    fn test_channel_name_validation() {
        let registry = registry();
        let conn = registry.admit(None);
        assert!(registry.join_channel(conn.id, "").is_err());
        assert!(registry.join_channel(conn.id, "has space").is_err());
        assert!(registry.join_channel(conn.id, &"x".repeat(129)).is_err());
        assert!(registry.join_channel(conn.id, "analysis-progress").is_ok());
    }

    #[test]
    fn test_leave_channel() {
        let registry = registry();
        let conn = registry.admit(None);
        registry.join_channel(conn.id, "news").unwrap();

        assert!(registry.leave_channel(conn.id, "news"));
        assert!(!registry.leave_channel(conn.id, "news"));
        assert_eq!(registry.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_heartbeat_reaps_silent_connection() {
        let registry = registry();
        let mut silent = registry.admit(None);
        let mut chatty = registry.admit(None);

        // First tick pings both.
        assert_eq!(registry.heartbeat_tick(Duration::ZERO).await, 0);
        assert_eq!(silent.outbound.recv().await.unwrap().kind, "ping");
        assert_eq!(chatty.outbound.recv().await.unwrap().kind, "ping");

        tokio::time::sleep(Duration::from_millis(5)).await;
        registry.record_pong(chatty.id);

        assert_eq!(registry.heartbeat_tick(Duration::from_millis(1)).await, 1);
        assert_eq!(silent.close.await.unwrap(), CloseReason::HeartbeatTimeout);
        assert!(registry.connection(chatty.id).is_some());
        assert!(chatty.close.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_degraded_connection_is_reaped() {
        let config = WsConfig {
            max_queue_size: 1,
            delivery_failure_threshold: 2,
            ..WsConfig::default()
        };
        let registry = ConnectionRegistry::new(&config);
        let conn = registry.admit(None);
        let envelope = Envelope::new("quote", None, json!({}));

        assert!(registry.deliver(conn.id, &envelope).is_ok());
        assert_eq!(
            registry.deliver(conn.id, &envelope),
            Err(DeliveryError::QueueFull)
        );
        assert!(!registry.connection(conn.id).unwrap().degraded);
        assert_eq!(
            registry.deliver(conn.id, &envelope),
            Err(DeliveryError::QueueFull)
        );
        assert!(registry.connection(conn.id).unwrap().degraded);

        assert_eq!(registry.heartbeat_tick(Duration::from_secs(60)).await, 1);
        assert_eq!(conn.close.await.unwrap(), CloseReason::DeliveryFailed);
    }

    #[tokio::test]
    async fn test_deliver_to_removed_connection() {
        let registry = registry();
        let conn = registry.admit(None);
        registry.remove(conn.id, CloseReason::Normal).await;

        let envelope = Envelope::new("quote", None, json!({}));
        assert_eq!(
            registry.deliver(conn.id, &envelope),
            Err(DeliveryError::Closed)
        );
    }

    #[test]
    fn test_user_connections_and_targets() {
        let registry = registry();
        let a1 = registry.admit(user("alice"));
        let a2 = registry.admit(user("alice"));
        let b = registry.admit(user("bob"));

        registry.join_channel(a1.id, "news").unwrap();
        registry.join_channel(b.id, "news").unwrap();

        let alice: Vec<ConnectionId> = registry
            .user_connections("alice")
            .into_iter()
            .map(|info| info.id)
            .collect();
        assert_eq!(alice, vec![a1.id, a2.id]);

        let mut both = registry.targets(&BroadcastFilter::channel("news").for_user("alice"));
        both.sort();
        assert_eq!(both, vec![a1.id]);
        assert_eq!(registry.targets(&BroadcastFilter::all()).len(), 3);
        assert_eq!(registry.targets(&BroadcastFilter::user("bob")), vec![b.id]);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::generate();
        assert_eq!(id.to_string(), format!("conn-{}", id.as_u64()));
        assert!(ConnectionId::generate().as_u64() > id.as_u64());
    }
}
