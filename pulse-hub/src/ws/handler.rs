//! WebSocket connection handler.
//!
//! This module provides the WebSocket upgrade handler and the per-socket
//! read and write loops.

use axum::{
    extract::{
        Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::IntoResponse,
};
use flate2::{Compression, write::GzEncoder};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use pulse_telemetry::masking::mask_token;
use pulse_telemetry::metrics::PulseMetrics;
use pulse_telemetry::spans::connection_span;
use serde::Deserialize;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, error, info, warn};

use super::config::WsConfig;
use super::connection::{Admission, ConnectionId};
use super::message::{CloseReason, Envelope};
use crate::auth::credential_from_request;
use crate::hub::Hub;

/// How long the writer gets to flush queued envelopes and the close frame.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Query parameters for WebSocket connection.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Optional bearer credential
    #[serde(default)]
    pub token: Option<String>,
}

/// WebSocket upgrade handler.
///
/// The credential comes from `?token=` or an `Authorization: Bearer` header.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    State(hub): State<Arc<Hub>>,
) -> impl IntoResponse {
    let credential = credential_from_request(query.token.as_deref(), &headers);
    let max_message_size = hub.config().max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, credential, hub))
}

/// Runs the auth gate, then serves the connection until it closes.
async fn handle_socket(mut socket: WebSocket, credential: Option<String>, hub: Arc<Hub>) {
    let identity = match hub.authenticate(credential.as_deref()).await {
        Ok(identity) => identity,
        Err(e) => {
            let masked = credential.as_deref().map(mask_token);
            warn!(error = %e, credential = ?masked, "WebSocket connection rejected");
            PulseMetrics::auth_rejected(e.as_str());
            let _ = socket.send(close_message(e.close_reason())).await;
            return;
        }
    };

    let user_id = identity.as_ref().map(|identity| identity.user_id.clone());
    let admission = hub.admit(identity);
    let span = connection_span(&admission.id.to_string(), user_id.as_deref());
    serve(socket, admission, hub).instrument(span).await;
}

async fn serve(socket: WebSocket, admission: Admission, hub: Arc<Hub>) {
    let Admission {
        id,
        outbound,
        close,
    } = admission;
    info!("WebSocket connection opened");

    let (sink, stream) = socket.split();
    let mut writer = tokio::spawn(
        write_loop(sink, outbound, close, hub.config().clone()).in_current_span(),
    );

    let mut writer_done = false;
    let reason = tokio::select! {
        reason = read_loop(stream, id, &hub) => reason,
        _ = &mut writer => {
            writer_done = true;
            CloseReason::Normal
        }
    };

    // A no-op when the registry already removed the connection.
    hub.remove(id, reason).await;

    if !writer_done && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        warn!("Writer did not drain in time");
        writer.abort();
    }
    info!(reason = %reason, "WebSocket connection closed");
}

/// Forwards queued envelopes to the socket until the registry signals close.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Envelope>,
    mut close: oneshot::Receiver<CloseReason>,
    config: WsConfig,
) {
    loop {
        tokio::select! {
            biased;
            reason = &mut close => {
                let reason = reason.unwrap_or(CloseReason::Normal);
                while let Ok(envelope) = outbound.try_recv() {
                    if !write_envelope(&mut sink, &envelope, &config).await {
                        return;
                    }
                }
                let _ = sink.send(close_message(reason)).await;
                let _ = sink.close().await;
                return;
            }
            envelope = outbound.recv() => {
                let Some(envelope) = envelope else {
                    return;
                };
                if !write_envelope(&mut sink, &envelope, &config).await {
                    return;
                }
            }
        }
    }
}

/// Returns false once the socket stops accepting frames.
async fn write_envelope(
    sink: &mut SplitSink<WebSocket, Message>,
    envelope: &Envelope,
    config: &WsConfig,
) -> bool {
    match serialize_message(envelope, config) {
        Ok(message) => sink.send(message).await.is_ok(),
        Err(e) => {
            error!(kind = %envelope.kind, error = %e, "Failed to serialize envelope");
            true
        }
    }
}

/// Feeds inbound frames to the hub. Returns why the socket stopped.
async fn read_loop(mut stream: SplitStream<WebSocket>, id: ConnectionId, hub: &Hub) -> CloseReason {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => hub.handle_text(id, text.as_str()).await,
            Ok(Message::Binary(data)) => match decompress_message(&data) {
                Ok(text) => hub.handle_text(id, &text).await,
                Err(e) => {
                    warn!(error = %e, "Undecodable binary frame");
                    return CloseReason::ProtocolError;
                }
            },
            Ok(Message::Ping(_)) => debug!("Received ping frame"),
            Ok(Message::Pong(_)) => hub.registry().record_pong(id),
            Ok(Message::Close(frame)) => {
                debug!(?frame, "Close requested by client");
                return CloseReason::Normal;
            }
            Err(e) => {
                warn!(error = %e, "WebSocket error");
                return CloseReason::ProtocolError;
            }
        }
    }
    CloseReason::Normal
}

fn close_message(reason: CloseReason) -> Message {
    Message::Close(Some(CloseFrame {
        code: reason.code(),
        reason: reason.as_str().into(),
    }))
}

/// Serializes an envelope, optionally compressing it.
fn serialize_message(envelope: &Envelope, config: &WsConfig) -> Result<Message, serde_json::Error> {
    let json = serde_json::to_string(envelope)?;

    if config.enable_compression && json.len() > config.compression_threshold {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        if encoder.write_all(json.as_bytes()).is_ok()
            && let Ok(compressed) = encoder.finish()
            && compressed.len() < json.len()
        {
            return Ok(Message::Binary(compressed.into()));
        }
    }

    Ok(Message::Text(json.into()))
}

/// Decompresses a binary message.
fn decompress_message(data: &[u8]) -> Result<String, std::io::Error> {
    use flate2::read::GzDecoder;
    use std::io::Read;

    let mut decoder = GzDecoder::new(data);
    let mut text = String::new();
    decoder.read_to_string(&mut text)?;
    Ok(text)
}
