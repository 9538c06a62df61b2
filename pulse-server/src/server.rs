//! Main server implementation.
//!
//! Wires the simulated feed into a hub, serves it over HTTP and tears both
//! down on shutdown.

use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use pulse_core::config::{ConfigLoader, Validatable};
use pulse_hub::{Hub, HubServer, InMemoryStore, JwtManager};
use pulse_telemetry::logging::init_logging;
use pulse_telemetry::metrics::init_metrics;

use crate::config::{ENV_PREFIX, ServerConfig};
use crate::feed::SimulatedFeed;
use crate::shutdown::{ShutdownController, setup_signal_handlers};

/// Lifecycle state of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not started, or fully stopped.
    Stopped,
    /// Telemetry initialized, not yet serving.
    Starting,
    /// Serving connections.
    Running,
    /// Closing connections and stopping the feed.
    ShuttingDown,
}

/// The Pulse server process.
pub struct PulseServer {
    config: ServerConfig,
    state: Arc<RwLock<ServerState>>,
    shutdown: ShutdownController,
    _log_guards: Vec<WorkerGuard>,
}

impl PulseServer {
    /// Creates a server from a validated configuration.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(ServerState::Stopped)),
            shutdown: ShutdownController::new(),
            _log_guards: Vec::new(),
        }
    }

    /// Loads a config file, applies `PULSE_*` overrides and validates.
    pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ServerConfig, ServerError> {
        let loader = ConfigLoader::new().with_env_prefix(ENV_PREFIX);
        let mut config: ServerConfig = loader
            .load_file(path)
            .map_err(|e| ServerError::ConfigError(e.to_string()))?;

        config.apply_env_overrides();
        config
            .validate()
            .map_err(|e| ServerError::ConfigError(e.to_string()))?;

        Ok(config)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the current lifecycle state.
    pub async fn state(&self) -> ServerState {
        *self.state.read().await
    }

    /// Returns the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    /// Installs logging and metrics.
    pub async fn initialize(&mut self) -> Result<(), ServerError> {
        self.transition(ServerState::Stopped, ServerState::Starting)
            .await?;

        let guards = init_logging(&self.config.logging).map_err(|e| {
            ServerError::InitializationError(format!("Failed to initialize logging: {e}"))
        })?;
        self._log_guards = guards;
        info!(level = %self.config.logging.level, "Logging initialized");

        self.init_metrics();
        Ok(())
    }

    /// Like [`initialize`](Self::initialize) but leaves the global
    /// subscriber and recorder alone.
    pub async fn initialize_without_telemetry(&self) -> Result<(), ServerError> {
        self.transition(ServerState::Stopped, ServerState::Starting)
            .await
    }

    fn init_metrics(&self) {
        if !self.config.metrics.enabled {
            info!("Metrics disabled");
            return;
        }
        match init_metrics(&self.config.metrics) {
            Ok(()) => info!("Metrics initialized"),
            Err(e) => warn!("Metrics initialization: {}", e),
        }
    }

    /// Binds the configured address and serves until SIGINT/SIGTERM or
    /// [`shutdown`](Self::shutdown).
    pub async fn run(&self) -> Result<(), ServerError> {
        let addr = self.config.server.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::RuntimeError(format!("Failed to bind to {addr}: {e}")))?;

        let shutdown_ctrl = self.shutdown.clone();
        tokio::spawn(async move {
            setup_signal_handlers(shutdown_ctrl).await;
        });

        self.run_on(listener).await
    }

    /// Serves on an existing listener until shutdown is initiated.
    pub async fn run_on(&self, listener: TcpListener) -> Result<(), ServerError> {
        self.transition(ServerState::Starting, ServerState::Running)
            .await?;

        let (feed, quotes) = SimulatedFeed::new(self.config.feed.clone());
        let jwt = JwtManager::new(&self.config.server.jwt);
        let hub = Hub::new(
            self.config.server.websocket.clone(),
            Arc::new(jwt),
            feed.clone(),
            Arc::new(InMemoryStore::new()),
        );
        hub.start(quotes);

        info!(
            address = %self.config.server.bind_address(),
            anonymous = self.config.server.websocket.allow_anonymous,
            "Pulse server running"
        );

        let shutdown = self.shutdown.clone();
        let result = HubServer::new(self.config.server.clone(), hub.clone())
            .run_on(listener, async move { shutdown.wait_for_shutdown().await })
            .await
            .map_err(|e| ServerError::RuntimeError(format!("Hub server error: {e}")));

        self.graceful_shutdown(&hub, &feed).await;
        result
    }

    async fn graceful_shutdown(&self, hub: &Arc<Hub>, feed: &Arc<SimulatedFeed>) {
        *self.state.write().await = ServerState::ShuttingDown;
        info!("Performing graceful shutdown...");

        // Closes whatever the HTTP shutdown path did not reach.
        if tokio::time::timeout(self.config.shutdown.timeout(), hub.shutdown())
            .await
            .is_err()
        {
            warn!(
                timeout_secs = self.config.shutdown.timeout_secs,
                "Hub shutdown timed out"
            );
        }
        feed.stop_all();

        *self.state.write().await = ServerState::Stopped;
        self.shutdown.mark_complete();
        info!("Graceful shutdown complete");
    }

    /// Initiates shutdown.
    pub fn shutdown(&self) {
        self.shutdown.initiate_shutdown();
    }

    async fn transition(&self, from: ServerState, to: ServerState) -> Result<(), ServerError> {
        let mut state = self.state.write().await;
        if *state != from {
            return Err(ServerError::InvalidState(format!(
                "expected {from:?}, found {:?}",
                *state
            )));
        }
        *state = to;
        Ok(())
    }
}

/// Server lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Telemetry could not be installed.
    #[error("Initialization error: {0}")]
    InitializationError(String),

    /// Lifecycle method called out of order.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Serving failed.
    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedConfig;
    use pulse_client::{ClientConfig, ClientState, Envelope, HubCallback, HubClient};
    use std::io::Write;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn test_config() -> ServerConfig {
        let mut config = ServerConfig {
            feed: FeedConfig {
                interval_ms: 20,
                ..FeedConfig::default()
            },
            ..ServerConfig::default()
        };
        config.server.host = "127.0.0.1".to_string();
        config.shutdown.timeout_secs = 5;
        config
    }

    struct Forward(mpsc::UnboundedSender<Envelope>);

    #[async_trait::async_trait]
    impl HubCallback for Forward {
        async fn on_envelope(&self, envelope: Envelope) {
            let _ = self.0.send(envelope);
        }
    }

    #[tokio::test]
    async fn test_server_new() {
        let server = PulseServer::new(ServerConfig::default());
        assert_eq!(server.state().await, ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_cannot_run_before_initialize() {
        let server = PulseServer::new(test_config());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let result = server.run_on(listener).await;
        assert!(matches!(result, Err(ServerError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_initialize_twice_fails() {
        let server = PulseServer::new(test_config());
        server.initialize_without_telemetry().await.unwrap();
        assert_eq!(server.state().await, ServerState::Starting);
        assert!(server.initialize_without_telemetry().await.is_err());
    }

    #[test]
    fn test_load_config_validates() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"feed": {{"interval_ms": 0}}}}"#).unwrap();

        let result = PulseServer::load_config(file.path());
        assert!(matches!(result, Err(ServerError::ConfigError(_))));
    }

    #[test]
    fn test_load_config_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(PulseServer::load_config(file.path()).is_err());
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::ConfigError("test error".to_string());
        assert_eq!(err.to_string(), "Configuration error: test error");
    }

    #[tokio::test]
    async fn test_quotes_flow_end_to_end_and_shutdown() {
        let server = Arc::new(PulseServer::new(test_config()));
        server.initialize_without_telemetry().await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        let running = {
            let server = server.clone();
            tokio::spawn(async move { server.run_on(listener).await })
        };

        let client = HubClient::new(
            ClientConfig::builder()
                .url(url)
                .reconnect_enabled(false)
                .build(),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        client.set_callback(Forward(tx));
        client.start();

        let mut status = client.status();
        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| s.state == ClientState::Connected),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(server.state().await, ServerState::Running);

        client.subscribe(&["AAPL"], true).await.unwrap();
        let quote = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let envelope = rx.recv().await.unwrap();
                if envelope.kind == "quote" {
                    return envelope;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(quote.channel.as_deref(), Some("quotes"));
        assert_eq!(quote.data["symbol"], "AAPL");

        server.shutdown();
        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(server.state().await, ServerState::Stopped);
        assert!(
            server
                .shutdown_controller()
                .wait_for_completion(Duration::from_millis(100))
                .await
        );
        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| s.state != ClientState::Connected),
        )
        .await
        .unwrap()
        .unwrap();
    }
}
