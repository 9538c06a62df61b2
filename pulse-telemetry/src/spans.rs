//! Span definitions for connection tracing.
//!
//! Everything logged while one connection's traffic is processed carries the
//! connection id, so a single client session can be followed through the hub.

use tracing::{Span, info_span};

use crate::masking::SensitiveDataMasker;

/// Create a span covering the lifetime of one WebSocket connection.
///
/// # Example
///
/// ```
/// use pulse_telemetry::spans::connection_span;
///
/// let span = connection_span("3f2a", Some("user-1"));
/// let _guard = span.enter();
/// // ... serve the connection
/// ```
#[must_use]
pub fn connection_span(conn_id: &str, user_id: Option<&str>) -> Span {
    info_span!(
        "connection",
        conn_id = %conn_id,
        user_id = user_id.unwrap_or("anonymous"),
        otel.kind = "server"
    )
}

/// Create a span for dispatching one inbound envelope.
#[must_use]
pub fn dispatch_span(conn_id: &str, kind: &str, channel: Option<&str>) -> Span {
    info_span!(
        "dispatch",
        conn_id = %conn_id,
        kind = %kind,
        channel = channel.unwrap_or("-")
    )
}

/// Create a span for a call into the upstream market-data feed.
#[must_use]
pub fn upstream_span(symbol: &str, operation: &str) -> Span {
    info_span!(
        "upstream",
        symbol = %symbol,
        operation = %operation,
        otel.kind = "client"
    )
}

/// Create a span for HTTP request tracing.
///
/// `target` is the request path with its query; a `?token=` credential is
/// masked before it is recorded.
#[must_use]
pub fn request_span(request_id: &str, method: &str, target: &str) -> Span {
    let target = SensitiveDataMasker::new().mask_string(target);
    info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        target = %target,
        otel.kind = "server"
    )
}
