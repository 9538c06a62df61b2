//! Hub metrics recorder with pre-defined metrics.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Pre-defined metrics for the Pulse hub.
///
/// All metrics follow the naming convention: `pulse_<category>_<metric>_<unit>`
pub struct PulseMetrics;

impl PulseMetrics {
    /// Register all metric descriptions.
    pub fn register() {
        // Connection metrics
        describe_gauge!("pulse_connections_active", "Number of open connections");
        describe_counter!(
            "pulse_connections_opened_total",
            "Total number of admitted connections"
        );
        describe_counter!(
            "pulse_connections_closed_total",
            "Total number of closed connections by close reason"
        );
        describe_counter!(
            "pulse_auth_rejected_total",
            "Total number of connection attempts rejected by the auth gate"
        );

        // Upstream metrics
        describe_gauge!(
            "pulse_upstream_subscriptions_active",
            "Number of symbols with a live upstream feed subscription"
        );

        // Delivery metrics
        describe_counter!(
            "pulse_broadcast_sent_total",
            "Total number of envelopes handed to connection queues"
        );
        describe_counter!(
            "pulse_broadcast_failed_total",
            "Total number of envelopes rejected by connection queues"
        );

        // Dispatch metrics
        describe_counter!(
            "pulse_dispatch_unroutable_total",
            "Total number of inbound envelopes with no matching handler"
        );
        describe_counter!(
            "pulse_dispatch_handler_errors_total",
            "Total number of handler failures during dispatch"
        );
        describe_histogram!(
            "pulse_dispatch_latency_seconds",
            "Time spent handling one inbound envelope"
        );

        // Client metrics
        describe_counter!(
            "pulse_client_reconnects_total",
            "Total number of reconnect attempts made by the client"
        );
    }

    // ==================== Connection Metrics ====================

    /// Record an admitted connection.
    pub fn connection_opened(authenticated: bool) {
        counter!(
            "pulse_connections_opened_total",
            "authenticated" => authenticated.to_string()
        )
        .increment(1);
        gauge!("pulse_connections_active").increment(1.0);
    }

    /// Record a connection leaving the registry.
    pub fn connection_closed(reason: &'static str) {
        counter!("pulse_connections_closed_total", "reason" => reason).increment(1);
        gauge!("pulse_connections_active").decrement(1.0);
    }

    /// Record a rejected connection attempt.
    pub fn auth_rejected(reason: &'static str) {
        counter!("pulse_auth_rejected_total", "reason" => reason).increment(1);
    }

    // ==================== Upstream Metrics ====================

    /// Record an upstream feed subscription being opened.
    pub fn upstream_opened() {
        gauge!("pulse_upstream_subscriptions_active").increment(1.0);
    }

    /// Record an upstream feed subscription being torn down.
    pub fn upstream_closed() {
        gauge!("pulse_upstream_subscriptions_active").decrement(1.0);
    }

    // ==================== Delivery Metrics ====================

    /// Record the outcome of one fan-out pass.
    pub fn broadcast(channel: &str, sent: usize, failed: usize) {
        if sent > 0 {
            counter!("pulse_broadcast_sent_total", "channel" => channel.to_string())
                .increment(sent as u64);
        }
        if failed > 0 {
            counter!("pulse_broadcast_failed_total", "channel" => channel.to_string())
                .increment(failed as u64);
        }
    }

    // ==================== Dispatch Metrics ====================

    /// Record an envelope with no matching handler.
    pub fn dispatch_unroutable(kind: &str) {
        counter!("pulse_dispatch_unroutable_total", "type" => kind.to_string()).increment(1);
    }

    /// Record a handler failure.
    pub fn dispatch_handler_error(kind: &str) {
        counter!("pulse_dispatch_handler_errors_total", "type" => kind.to_string()).increment(1);
    }

    /// Record dispatch latency.
    pub fn dispatch_latency(kind: &str, latency_seconds: f64) {
        histogram!("pulse_dispatch_latency_seconds", "type" => kind.to_string())
            .record(latency_seconds);
    }

    // ==================== Client Metrics ====================

    /// Record a client reconnect attempt.
    pub fn client_reconnect() {
        counter!("pulse_client_reconnects_total").increment(1);
    }
}
