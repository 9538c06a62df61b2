//! WebSocket broadcaster for pushing envelopes to clients.
//!
//! Fan-out never waits on a socket: each target's outbound queue either
//! accepts the envelope or the attempt counts as failed. Counts are exact for
//! one call.

use pulse_telemetry::metrics::PulseMetrics;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::connection::{ConnectionId, ConnectionRegistry};
use super::message::Envelope;

/// Target selection for a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastFilter {
    /// Only members of this channel
    pub channel: Option<String>,
    /// Only connections of this user
    pub user_id: Option<String>,
}

impl BroadcastFilter {
    /// Every open connection.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Members of `channel`.
    #[must_use]
    pub fn channel(channel: impl Into<String>) -> Self {
        Self {
            channel: Some(channel.into()),
            user_id: None,
        }
    }

    /// Connections of `user_id`.
    #[must_use]
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            channel: None,
            user_id: Some(user_id.into()),
        }
    }

    /// Narrows the filter to `user_id`.
    #[must_use]
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Envelopes accepted by a connection queue
    pub sent: usize,
    /// Envelopes rejected by a connection queue
    pub failed: usize,
}

/// WebSocket broadcaster.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    /// Creates a new broadcaster.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Sends `envelope` to every open connection matching `filter`.
    #[instrument(skip(self, envelope), fields(kind = %envelope.kind, channel = ?filter.channel, user_id = ?filter.user_id))]
    pub fn broadcast(&self, envelope: &Envelope, filter: &BroadcastFilter) -> BroadcastReport {
        let targets = self.registry.targets(filter);
        let report = self.send_all(envelope, &targets);
        PulseMetrics::broadcast(filter.channel.as_deref().unwrap_or("*"), report.sent, report.failed);
        debug!(sent = report.sent, failed = report.failed, "Broadcast complete");
        report
    }

    /// Sends `envelope` to an explicit set of connections.
    #[instrument(skip(self, envelope, targets), fields(kind = %envelope.kind, targets = targets.len()))]
    pub fn deliver(&self, envelope: &Envelope, targets: &[ConnectionId]) -> BroadcastReport {
        let report = self.send_all(envelope, targets);
        PulseMetrics::broadcast(envelope.channel().unwrap_or("*"), report.sent, report.failed);
        debug!(sent = report.sent, failed = report.failed, "Delivery complete");
        report
    }

    fn send_all(&self, envelope: &Envelope, targets: &[ConnectionId]) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for id in targets {
            match self.registry.deliver(*id, envelope) {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    debug!(conn_id = %id, error = %e, "Delivery failed");
                    report.failed += 1;
                }
            }
        }
        report
    }
}
