//! Hub HTTP server.
//!
//! Serves `/ws` and the operational endpoints, and closes every hub
//! connection when the shutdown signal fires.

use axum::{Router, body::Body, http::Request};
use pulse_telemetry::spans::request_span;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::HubConfig;
use crate::error::HubError;
use crate::hub::Hub;
use crate::routes::create_router;

/// Hub server.
#[derive(Debug)]
pub struct HubServer {
    config: HubConfig,
    hub: Arc<Hub>,
}

impl HubServer {
    /// Creates a server for an already constructed hub.
    #[must_use]
    pub fn new(config: HubConfig, hub: Arc<Hub>) -> Self {
        Self { config, hub }
    }

    /// Returns the hub served by this server.
    #[must_use]
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Builds the router with tracing applied.
    pub fn router(&self) -> Router {
        create_router(self.hub.clone(), &self.config.cors).layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = uuid::Uuid::new_v4().to_string();
                request_span(
                    &request_id,
                    request.method().as_str(),
                    &request.uri().to_string(),
                )
            }),
        )
    }

    /// Binds the configured address and serves until `shutdown_signal`
    /// completes.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or run.
    pub async fn run_with_shutdown(
        self,
        shutdown_signal: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), HubError> {
        let addr = self.config.bind_address();

        let socket_addr: SocketAddr = addr
            .parse()
            .map_err(|e| HubError::Internal(format!("Invalid bind address: {e}")))?;

        let listener = TcpListener::bind(socket_addr)
            .await
            .map_err(|e| HubError::Internal(format!("Failed to bind to {addr}: {e}")))?;

        self.run_on(listener, shutdown_signal).await
    }

    /// Serves on an existing listener.
    ///
    /// When `shutdown_signal` completes, every connection is closed with
    /// `server_shutdown` before the listener stops.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails while running.
    pub async fn run_on(
        self,
        listener: TcpListener,
        shutdown_signal: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), HubError> {
        let local = listener
            .local_addr()
            .map_err(|e| HubError::Internal(format!("Listener has no address: {e}")))?;
        let app = self.router();
        info!("Hub server listening on {}", local);

        let hub = self.hub.clone();
        let signal = async move {
            shutdown_signal.await;
            info!("Shutdown signal received, closing connections");
            hub.shutdown().await;
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| HubError::Internal(format!("Server error: {e}")))?;

        warn!("Hub server stopped");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::JwtManager;
    use crate::store::InMemoryStore;
    use crate::testing::CountingFeed;
    use futures::StreamExt;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::Message;

    fn server() -> HubServer {
        let config = HubConfig::default();
        let hub = Hub::new(
            config.websocket.clone(),
            Arc::new(JwtManager::new(&config.jwt)),
            Arc::new(CountingFeed::new()),
            Arc::new(InMemoryStore::new()),
        );
        HubServer::new(config, hub)
    }

    #[tokio::test]
    async fn test_hub_accessor() {
        let server = server();
        let hub = server.hub().clone();
        assert!(Arc::ptr_eq(server.hub(), &hub));
        let _router = server.router();
    }

    #[tokio::test]
    async fn test_invalid_bind_address() {
        let mut server = server();
        server.config.host = "not a host".into();
        let result = server.run_with_shutdown(async {}).await;
        assert!(matches!(result, Err(HubError::Internal(_))));
    }

    #[tokio::test]
    async fn test_shutdown_signal_closes_connections() {
        let server = server();
        let hub = server.hub().clone();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let running = tokio::spawn(server.run_on(listener, async {
            let _ = stopped.await;
        }));

        let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap();
        assert!(matches!(client.next().await, Some(Ok(Message::Text(_)))));
        assert_eq!(hub.connection_count(), 1);

        stop.send(()).unwrap();
        let code = loop {
            match client.next().await {
                Some(Ok(Message::Close(Some(frame)))) => break u16::from(frame.code),
                Some(Ok(_)) => {}
                other => panic!("expected a close frame, got {other:?}"),
            }
        };
        assert_eq!(code, 1001);

        tokio::time::timeout(std::time::Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(hub.connection_count(), 0);
    }
}
