//! Metrics collection and export for the hub.
//!
//! Provides Prometheus-compatible metrics for monitoring:
//! - Connection admission, closure and auth rejection
//! - Upstream feed subscriptions
//! - Fan-out delivery and dispatch outcomes

mod config;
mod recorder;

pub use config::MetricsConfig;
pub use recorder::PulseMetrics;

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics system with the given configuration.
///
/// # Errors
///
/// Returns an error if the listener address is invalid or a recorder is
/// already installed.
///
/// # Example
///
/// ```no_run
/// use pulse_telemetry::metrics::{init_metrics, MetricsConfig};
///
/// let config = MetricsConfig::default();
/// init_metrics(&config).expect("Failed to initialize metrics");
/// ```
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if METRICS_HANDLE.get().is_some() {
        return Err(MetricsError::AlreadyInitialized);
    }

    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("_seconds".to_string()),
            &config.latency_buckets,
        )
        .map_err(|e| MetricsError::InitializationFailed(format!("{e}")))?;

    let handle = if config.expose_endpoint {
        let addr: SocketAddr = config
            .endpoint_address
            .parse()
            .map_err(|e| MetricsError::InvalidAddress(format!("{e}")))?;

        builder
            .with_http_listener(addr)
            .install_recorder()
            .map_err(|e| MetricsError::InitializationFailed(format!("{e}")))?
    } else {
        builder
            .install_recorder()
            .map_err(|e| MetricsError::InitializationFailed(format!("{e}")))?
    };

    METRICS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::AlreadyInitialized)?;

    PulseMetrics::register();

    Ok(())
}

/// Get the Prometheus metrics output as a string.
///
/// Returns an empty string if metrics have not been initialized.
#[must_use]
pub fn render_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

/// Errors that can occur during metrics initialization.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Metrics already initialized
    #[error("Metrics system already initialized")]
    AlreadyInitialized,

    /// Invalid endpoint address
    #[error("Invalid endpoint address: {0}")]
    InvalidAddress(String),

    /// Initialization failed
    #[error("Metrics initialization failed: {0}")]
    InitializationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_without_recorder_is_empty() {
        if METRICS_HANDLE.get().is_none() {
            assert!(render_metrics().is_empty());
        }
    }

    #[test]
    fn test_invalid_address_rejected() {
        let config = MetricsConfig {
            expose_endpoint: true,
            endpoint_address: "not an address".to_string(),
            ..MetricsConfig::default()
        };
        assert!(matches!(
            init_metrics(&config),
            Err(MetricsError::InvalidAddress(_) | MetricsError::AlreadyInitialized)
        ));
    }
}
