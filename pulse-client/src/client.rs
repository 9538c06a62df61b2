//! Hub client with automatic reconnection and subscription replay.

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use pulse_core::error::NetworkError;
use pulse_core::types::Symbol;
use pulse_telemetry::metrics::PulseMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header::AUTHORIZATION};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::intent::{IntentStore, SubscriptionIntent};
use crate::message::{Envelope, MessageCodec};
use crate::state::{ClientState, ClientStatus};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Close codes the hub uses for credential failures.
const AUTH_CLOSE_CODES: [u16; 2] = [4000, 4001];

/// Callback trait for hub events.
#[async_trait]
pub trait HubCallback: Send + Sync {
    /// Called for every inbound envelope, including acks and quotes.
    ///
    /// Runs on the connection task. Awaiting [`HubClient::send`] or a
    /// subscribe from here blocks that task; spawn the call instead.
    async fn on_envelope(&self, envelope: Envelope);

    /// Called after admission, once subscriptions have been replayed.
    async fn on_connected(&self, connection_id: &str) {
        let _ = connection_id;
    }

    /// Called when a connection ends.
    async fn on_disconnected(&self, error: Option<&NetworkError>) {
        let _ = error;
    }

    /// Called before waiting to reconnect.
    async fn on_reconnecting(&self, attempt: u32, delay: Duration) {
        let _ = (attempt, delay);
    }
}

/// How a subscription request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Written to the live socket
    Sent,
    /// Recorded; takes effect on the next admission
    Deferred,
}

/// A queued frame and the signal that it reached the socket.
struct Outbound {
    frame: Message,
    flushed: oneshot::Sender<()>,
}

enum SessionEnd {
    Shutdown,
    Failed(NetworkError),
}

struct Shared {
    config: ClientConfig,
    intents: IntentStore,
    status: watch::Sender<ClientStatus>,
    outbound: Mutex<Option<mpsc::Sender<Outbound>>>,
    callback: RwLock<Option<Arc<dyn HubCallback>>>,
}

/// Client for the Pulse hub.
///
/// # Features
///
/// - Automatic reconnection with capped exponential backoff
/// - Subscription intents replayed after every admission
/// - Status published on a `watch` channel
/// - Answers hub heartbeats
///
/// # Example
///
/// ```no_run
/// use pulse_client::{ClientConfig, HubClient};
///
/// # async fn run() -> Result<(), pulse_client::ClientError> {
/// let config = ClientConfig::builder()
///     .url("ws://localhost:8080/ws")
///     .token("<jwt>")
///     .build();
///
/// let client = HubClient::new(config);
/// client.start();
/// client.subscribe(&["AAPL", "TSLA"], true).await?;
/// # Ok(())
/// # }
/// ```
pub struct HubClient {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for HubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubClient")
            .field("config", &self.shared.config)
            .field("status", &*self.shared.status.borrow())
            .finish_non_exhaustive()
    }
}

impl HubClient {
    /// Creates a client. Nothing connects until [`start`](Self::start).
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let (status, _) = watch::channel(ClientStatus::default());
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                config,
                intents: IntentStore::new(),
                status,
                outbound: Mutex::new(None),
                callback: RwLock::new(None),
            }),
            shutdown,
            task: Mutex::new(None),
        }
    }

    /// Sets the callback for receiving events.
    pub fn set_callback(&self, callback: impl HubCallback + 'static) {
        *self.shared.callback.write() = Some(Arc::new(callback));
    }

    /// Subscribes to status changes.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<ClientStatus> {
        self.shared.status.subscribe()
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.shared.status.borrow().state
    }

    /// Returns whether the client is admitted by the hub.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Every recorded intent, sorted by symbol.
    #[must_use]
    pub fn intents(&self) -> Vec<SubscriptionIntent> {
        self.shared.intents.all()
    }

    /// Starts the connection loop. Does nothing if it is already running.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|running| !running.is_finished()) {
            return;
        }
        self.shutdown.send_replace(false);
        let shutdown = self.shutdown.subscribe();
        let span = info_span!("hub_client", url = %self.shared.config.url);
        *task = Some(tokio::spawn(
            run(self.shared.clone(), shutdown).instrument(span),
        ));
    }

    /// Closes the connection and stops reconnecting. Intents are kept.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Client task ended abnormally");
        }
    }

    /// Subscribes to quotes for `symbols`.
    ///
    /// Tickers are normalized first; an invalid one rejects the whole call.
    /// With `auto_resubscribe` the intent is kept across reconnects and the
    /// request is deferred while disconnected. Without it the request needs
    /// a live connection, and fails with [`ClientError::NotConnected`] if the
    /// connection drops before the frame is written.
    pub async fn subscribe<S: AsRef<str>>(
        &self,
        symbols: &[S],
        auto_resubscribe: bool,
    ) -> Result<Submission, ClientError> {
        self.ensure_running()?;
        let symbols = parse_symbols(symbols)?;
        if !auto_resubscribe && !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        self.shared.intents.subscribe(&symbols, auto_resubscribe);
        match self.shared.send(&Envelope::subscribe(&symbols)).await {
            Ok(()) => Ok(Submission::Sent),
            Err(ClientError::NotConnected) if auto_resubscribe => Ok(Submission::Deferred),
            Err(e) => {
                self.shared.intents.unsubscribe(&symbols);
                Err(e)
            }
        }
    }

    /// Unsubscribes from `symbols` and drops their intents.
    pub async fn unsubscribe<S: AsRef<str>>(&self, symbols: &[S]) -> Result<Submission, ClientError> {
        let symbols = parse_symbols(symbols)?;
        self.shared.intents.unsubscribe(&symbols);
        match self.shared.send(&Envelope::unsubscribe(&symbols)).await {
            Ok(()) => Ok(Submission::Sent),
            Err(ClientError::NotConnected) => Ok(Submission::Deferred),
            Err(e) => Err(e),
        }
    }

    /// Sends an arbitrary envelope on the live connection and waits until
    /// it is written to the socket.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), ClientError> {
        self.shared.send(envelope).await
    }

    fn ensure_running(&self) -> Result<(), ClientError> {
        let status = self.shared.status.borrow();
        match (&status.state, &status.last_error) {
            (ClientState::Error, Some(error)) => Err(ClientError::Stopped(error.clone())),
            _ => Ok(()),
        }
    }
}

impl Shared {
    fn update(&self, modify: impl FnOnce(&mut ClientStatus)) {
        self.status.send_modify(modify);
    }

    fn callback(&self) -> Option<Arc<dyn HubCallback>> {
        self.callback.read().clone()
    }

    async fn send(&self, envelope: &Envelope) -> Result<(), ClientError> {
        let sender = self
            .outbound
            .lock()
            .clone()
            .ok_or(ClientError::NotConnected)?;
        let frame = MessageCodec::encode(envelope)?;
        let (flushed, written) = oneshot::channel();
        sender
            .send(Outbound { frame, flushed })
            .await
            .map_err(|_| ClientError::NotConnected)?;
        // Dropped unsent when the session ends first.
        written.await.map_err(|_| ClientError::NotConnected)
    }

    async fn connect(&self) -> Result<WsStream, NetworkError> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| NetworkError::ConnectionFailed {
                reason: e.to_string(),
            })?;
        if let Some(token) = &self.config.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                NetworkError::ConnectionFailed {
                    reason: "credential is not a valid header value".to_string(),
                }
            })?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, _) = timeout(self.config.connect_timeout(), connect_async(request))
            .await
            .map_err(|_| NetworkError::Timeout {
                timeout_ms: self.config.connect_timeout_ms,
            })?
            .map_err(|e| NetworkError::ConnectionFailed {
                reason: e.to_string(),
            })?;
        Ok(stream)
    }

    /// Serves one connection until it ends.
    async fn session(&self, stream: WsStream, shutdown: &mut watch::Receiver<bool>) -> SessionEnd {
        let (mut sink, mut source) = stream.split();
        let (tx, mut rx) = mpsc::channel::<Outbound>(self.config.outbound_queue_size);
        // Installed as the outbound queue once the hub admits us.
        let mut pending = Some(tx);

        let end = loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let close = Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "client_shutdown".into(),
                        }));
                        let _ = sink.send(close).await;
                        let _ = sink.close().await;
                        break SessionEnd::Shutdown;
                    }
                }
                Some(outbound) = rx.recv() => {
                    if let Err(e) = sink.send(outbound.frame).await {
                        break SessionEnd::Failed(NetworkError::WebSocket { reason: e.to_string() });
                    }
                    let _ = outbound.flushed.send(());
                }
                frame = source.next() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => {
                            break SessionEnd::Failed(NetworkError::WebSocket { reason: e.to_string() });
                        }
                        None => {
                            break SessionEnd::Failed(NetworkError::ConnectionClosed {
                                code: 1006,
                                reason: "stream ended".to_string(),
                            });
                        }
                    };
                    if let Message::Close(close) = &frame {
                        break SessionEnd::Failed(close_error(close.as_ref()));
                    }

                    let envelope = match MessageCodec::decode(&frame) {
                        Ok(Some(envelope)) => envelope,
                        Ok(None) => continue,
                        Err(e) => {
                            warn!(error = %e, "Dropping undecodable frame");
                            continue;
                        }
                    };

                    if envelope.is_ping() {
                        if let Err(e) = self.reply_pong(&mut sink).await {
                            break SessionEnd::Failed(e);
                        }
                        continue;
                    }

                    if let Some(connection_id) = envelope.connection_id()
                        && let Some(tx) = pending.take()
                        && let Err(e) = self.admitted(connection_id, tx, &mut sink).await
                    {
                        break SessionEnd::Failed(e);
                    }

                    if let Some(callback) = self.callback() {
                        callback.on_envelope(envelope).await;
                    }
                }
            }
        };

        *self.outbound.lock() = None;
        end
    }

    async fn reply_pong(&self, sink: &mut WsSink) -> Result<(), NetworkError> {
        let frame = MessageCodec::encode(&Envelope::pong())?;
        sink.send(frame).await.map_err(|e| NetworkError::WebSocket {
            reason: e.to_string(),
        })
    }

    /// Marks the client connected and replays subscription intents.
    async fn admitted(
        &self,
        connection_id: &str,
        outbound: mpsc::Sender<Outbound>,
        sink: &mut WsSink,
    ) -> Result<(), NetworkError> {
        *self.outbound.lock() = Some(outbound);
        self.update(|status| status.mark_connected(connection_id.to_string()));
        info!(connection_id, "Connected to hub");

        let replay = self.intents.replay_set();
        if !replay.is_empty() {
            debug!(symbols = replay.len(), "Replaying subscriptions");
            let frame = MessageCodec::encode(&Envelope::subscribe(&replay))?;
            sink.send(frame).await.map_err(|e| NetworkError::WebSocket {
                reason: e.to_string(),
            })?;
        }

        if let Some(callback) = self.callback() {
            callback.on_connected(connection_id).await;
        }
        Ok(())
    }
}

fn parse_symbols<S: AsRef<str>>(symbols: &[S]) -> Result<Vec<Symbol>, ClientError> {
    symbols
        .iter()
        .map(|symbol| Symbol::new(symbol.as_ref()).map_err(ClientError::from))
        .collect()
}

fn close_error(frame: Option<&CloseFrame<'_>>) -> NetworkError {
    match frame {
        Some(frame) => {
            let code = u16::from(frame.code);
            let reason = frame.reason.to_string();
            if AUTH_CLOSE_CODES.contains(&code) {
                NetworkError::AuthRejected { code, reason }
            } else {
                NetworkError::ConnectionClosed { code, reason }
            }
        }
        None => NetworkError::ConnectionClosed {
            code: 1005,
            reason: "closed without status".to_string(),
        },
    }
}

/// Connect, serve, back off, repeat.
async fn run(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    shared.update(|status| status.reconnect_attempts = 0);

    loop {
        shared.update(ClientStatus::mark_connecting);
        let end = match shared.connect().await {
            Ok(stream) => shared.session(stream, &mut shutdown).await,
            Err(e) => SessionEnd::Failed(e),
        };
        shared.intents.connection_lost();

        let error = match end {
            SessionEnd::Shutdown => break,
            SessionEnd::Failed(error) => error,
        };
        let callback = shared.callback();
        if let Some(callback) = &callback {
            callback.on_disconnected(Some(&error)).await;
        }

        if !error.is_recoverable() {
            warn!(error = %error, "Hub rejected the credential, not reconnecting");
            shared.update(|status| status.mark_error(error));
            return;
        }

        shared.update(|status| status.mark_disconnected(Some(error.clone())));
        let attempt = shared.status.borrow().reconnect_attempts;
        if !shared.config.should_reconnect(attempt) {
            warn!(attempt, error = %error, "Giving up on the hub");
            shared.update(|status| status.mark_error(error));
            return;
        }

        let delay = shared.config.calculate_reconnect_delay(attempt);
        shared.update(ClientStatus::mark_reconnecting);
        PulseMetrics::client_reconnect();
        info!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            error = %error,
            "Connection lost, reconnecting"
        );
        if let Some(callback) = &callback {
            callback.on_reconnecting(attempt + 1, delay).await;
        }

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    shared.update(|status| status.mark_disconnected(None));
    info!("Hub client stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;
    use pulse_core::types::Symbol;
    use pulse_hub::config::{CorsConfig, JwtConfig};
    use pulse_hub::feed::{FeedError, FeedHandle, UpstreamFeed};
    use pulse_hub::{CloseReason, Hub, InMemoryStore, JwtManager, WsConfig};
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct TestFeed {
        next_id: AtomicU64,
        active: DashMap<u64, Symbol>,
    }

    impl TestFeed {
        fn symbols(&self) -> Vec<String> {
            let mut symbols: Vec<String> = self
                .active
                .iter()
                .map(|entry| entry.value().to_string())
                .collect();
            symbols.sort();
            symbols
        }
    }

    #[async_trait]
    impl UpstreamFeed for TestFeed {
        async fn subscribe(&self, symbol: &Symbol) -> Result<FeedHandle, FeedError> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.active.insert(id, symbol.clone());
            Ok(FeedHandle::new(id))
        }

        async fn unsubscribe(&self, handle: FeedHandle) -> Result<(), FeedError> {
            self.active.remove(&handle.id());
            Ok(())
        }
    }

    struct TestHub {
        hub: Arc<Hub>,
        feed: Arc<TestFeed>,
        jwt: JwtManager,
        url: String,
    }

    async fn spawn_hub(allow_anonymous: bool) -> TestHub {
        let jwt = JwtManager::new(&JwtConfig::default());
        let feed = Arc::new(TestFeed::default());
        let hub = Hub::new(
            WsConfig {
                allow_anonymous,
                ..WsConfig::default()
            },
            Arc::new(jwt.clone()),
            feed.clone(),
            Arc::new(InMemoryStore::new()),
        );
        let app = pulse_hub::routes::create_router(hub.clone(), &CorsConfig::default());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        TestHub {
            hub,
            feed,
            jwt,
            url,
        }
    }

    fn fast_config(url: &str, token: Option<&str>) -> ClientConfig {
        let builder = ClientConfig::builder()
            .url(url)
            .reconnect_delay(Duration::from_millis(10))
            .max_reconnect_delay(Duration::from_millis(100));
        match token {
            Some(token) => builder.token(token).build(),
            None => builder.build(),
        }
    }

    async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
        for _ in 0..300 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached: {what}");
    }

    async fn wait_for(client: &HubClient, check: impl FnMut(&ClientStatus) -> bool) -> ClientStatus {
        let mut status = client.status();
        timeout(Duration::from_secs(5), status.wait_for(check))
            .await
            .expect("status wait timed out")
            .expect("status channel closed")
            .clone()
    }

    struct Forward(mpsc::UnboundedSender<Envelope>);

    #[async_trait]
    impl HubCallback for Forward {
        async fn on_envelope(&self, envelope: Envelope) {
            let _ = self.0.send(envelope);
        }
    }

    #[tokio::test]
    async fn test_reconnect_replays_intents() {
        let server = spawn_hub(true).await;
        let client = HubClient::new(fast_config(&server.url, None));
        client.start();
        let first = wait_for(&client, |s| s.state == ClientState::Connected).await;

        assert_eq!(
            client.subscribe(&["AAPL", "TSLA"], true).await.unwrap(),
            Submission::Sent
        );
        eventually("upstream for both symbols", || server.feed.symbols() == ["AAPL", "TSLA"]).await;

        server
            .hub
            .registry()
            .remove_all(CloseReason::HeartbeatTimeout)
            .await;

        let second = wait_for(&client, |s| {
            s.state == ClientState::Connected && s.connection_id != first.connection_id
        })
        .await;
        assert!(second.connection_id.is_some());

        eventually("replayed subscriptions", || {
            server.feed.symbols() == ["AAPL", "TSLA"] && server.hub.upstream_count() == 2
        })
        .await;
        assert_eq!(server.hub.connection_count(), 1);
        assert_eq!(client.intents().len(), 2);

        client.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_token_moves_to_error() {
        let server = spawn_hub(false).await;
        let client = HubClient::new(fast_config(&server.url, Some("garbage")));
        client.start();

        let status = wait_for(&client, |s| s.state == ClientState::Error).await;
        assert!(matches!(
            status.last_error,
            Some(NetworkError::AuthRejected { code: 4001, .. })
        ));
        assert_eq!(status.reconnect_attempts, 0);
        assert!(matches!(
            client.subscribe(&["AAPL"], true).await,
            Err(ClientError::Stopped(_))
        ));
        assert_eq!(server.hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_valid_token_is_admitted() {
        let server = spawn_hub(false).await;
        let token = server.jwt.generate_token("alice", &[]).unwrap();
        let client = HubClient::new(fast_config(&server.url, Some(&token)));
        client.start();

        wait_for(&client, |s| s.state == ClientState::Connected).await;
        let users = server.hub.registry().user_connections("alice");
        assert_eq!(users.len(), 1);

        client.stop().await;
    }

    #[tokio::test]
    async fn test_subscribe_while_disconnected_is_deferred() {
        let server = spawn_hub(true).await;
        let client = HubClient::new(fast_config(&server.url, None));

        assert_eq!(
            client.subscribe(&["AAPL"], true).await.unwrap(),
            Submission::Deferred
        );
        assert!(matches!(
            client.subscribe(&["MSFT"], false).await,
            Err(ClientError::NotConnected)
        ));
        assert_eq!(client.intents().len(), 1);

        client.start();
        wait_for(&client, |s| s.state == ClientState::Connected).await;
        eventually("deferred subscription sent", || server.feed.symbols() == ["AAPL"]).await;

        client.stop().await;
    }

    #[tokio::test]
    async fn test_unsubscribe_drops_intent_and_upstream() {
        let server = spawn_hub(true).await;
        let client = HubClient::new(fast_config(&server.url, None));
        client.start();
        wait_for(&client, |s| s.state == ClientState::Connected).await;

        client.subscribe(&["AAPL", "TSLA"], true).await.unwrap();
        eventually("both subscribed", || server.feed.active.len() == 2).await;

        assert_eq!(client.unsubscribe(&["AAPL"]).await.unwrap(), Submission::Sent);
        eventually("AAPL torn down", || server.feed.symbols() == ["TSLA"]).await;
        assert_eq!(client.intents().len(), 1);

        client.stop().await;
        eventually("connection removed", || server.hub.connection_count() == 0).await;
        assert!(server.feed.active.is_empty());
        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[tokio::test]
    async fn test_callback_receives_acks() {
        let server = spawn_hub(true).await;
        let client = HubClient::new(fast_config(&server.url, None));
        let (tx, mut rx) = mpsc::unbounded_channel();
        client.set_callback(Forward(tx));
        client.start();
        wait_for(&client, |s| s.state == ClientState::Connected).await;

        client
            .send(&Envelope::subscribe(&["AAPL", "bad symbol"]))
            .await
            .unwrap();

        let ack = timeout(Duration::from_secs(5), async {
            loop {
                let envelope = rx.recv().await.unwrap();
                if envelope.kind == "ack" {
                    return envelope;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(ack.data["success"], false);
        assert_eq!(ack.data["subscribed"], serde_json::json!(["AAPL"]));
        assert_eq!(ack.data["errors"][0]["symbol"], "bad symbol");

        client.stop().await;
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        // Nothing listens on this port once the listener is dropped.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        drop(listener);

        let config = ClientConfig::builder()
            .url(url)
            .reconnect_delay(Duration::from_millis(5))
            .max_reconnect_attempts(2)
            .build();
        let client = HubClient::new(config);
        client.start();

        let status = wait_for(&client, |s| s.state == ClientState::Error).await;
        assert_eq!(status.reconnect_attempts, 2);
        assert!(matches!(
            status.last_error,
            Some(NetworkError::ConnectionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_intents_use_normalized_symbols() {
        let client = HubClient::new(fast_config("ws://127.0.0.1:1/ws", None));

        assert_eq!(
            client.subscribe(&["aapl", "00700"], true).await.unwrap(),
            Submission::Deferred
        );
        let names: Vec<String> = client.intents().iter().map(|i| i.symbol.to_string()).collect();
        assert_eq!(names, vec!["00700.HK", "AAPL"]);

        assert_eq!(
            client.unsubscribe(&["AAPL", "00700.hk"]).await.unwrap(),
            Submission::Deferred
        );
        assert!(client.intents().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_symbol_is_rejected() {
        let client = HubClient::new(fast_config("ws://127.0.0.1:1/ws", None));

        assert!(matches!(
            client.subscribe(&["AAPL", "bad symbol"], true).await,
            Err(ClientError::InvalidSymbol(_))
        ));
        assert!(client.intents().is_empty());
    }

    #[tokio::test]
    async fn test_frame_lost_with_session_is_not_reported_sent() {
        let client = HubClient::new(fast_config("ws://127.0.0.1:1/ws", None));
        let (tx, mut rx) = mpsc::channel::<Outbound>(8);
        *client.shared.outbound.lock() = Some(tx);
        client
            .shared
            .update(|status| status.mark_connected("conn-1".to_string()));

        // The session ends with frames still queued.
        let session = tokio::spawn(async move {
            let queued = rx.recv().await;
            drop(rx);
            queued.is_some()
        });

        assert!(matches!(
            client.subscribe(&["AAPL"], false).await,
            Err(ClientError::NotConnected)
        ));
        assert!(session.await.unwrap());
        assert!(client.intents().is_empty());
    }
}
