//! Health check and metrics handlers.

use axum::{Json, extract::State, http::header, response::IntoResponse};
use serde::Serialize;
use std::sync::Arc;

use crate::hub::Hub;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Service version
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime_secs: u64,
    /// Open connections
    pub connections: usize,
    /// Symbols with a live upstream subscription
    pub upstream_symbols: usize,
}

/// Health check handler.
///
/// GET /api/v1/health
pub async fn health_check(State(hub): State<Arc<Hub>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: hub.uptime().as_secs(),
        connections: hub.connection_count(),
        upstream_symbols: hub.upstream_count(),
    })
}

/// Prometheus text exposition.
///
/// GET /api/v1/metrics
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        pulse_telemetry::metrics::render_metrics(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::JwtManager;
    use crate::config::JwtConfig;
    use crate::store::InMemoryStore;
    use crate::testing::CountingFeed;
    use crate::ws::WsConfig;

    #[tokio::test]
    async fn test_health_check_reports_counts() {
        let hub = Hub::new(
            WsConfig::default(),
            Arc::new(JwtManager::new(&JwtConfig::default())),
            Arc::new(CountingFeed::new()),
            Arc::new(InMemoryStore::new()),
        );
        let _admission = hub.admit(None);

        let response = health_check(State(hub)).await;

        assert_eq!(response.status, "healthy");
        assert_eq!(response.connections, 1);
        assert_eq!(response.upstream_symbols, 0);
    }
}
