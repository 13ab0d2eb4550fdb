//! Outbound HTTP/WebSocket adapter (C7). Thin: every route delegates
//! straight to `telemetry-core`'s hub or archive reader.

use crate::pipeline::RawDatagram;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use telemetry_core::archive::ArchiveError;
use telemetry_core::queue::DropOldestQueue;
use telemetry_core::{ArchiveReader, Hub, IngestCounters};
use telemetry_protocol::EnrichedPacket;
use tokio::time::timeout;
use tracing::{info, warn};

const WS_SUBSCRIPTION_BUFFER_CAPACITY: usize = 100;
const WS_IDLE_POLL: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub<EnrichedPacket>>,
    pub archive_reader: Arc<ArchiveReader>,
    pub counters: Arc<IngestCounters>,
    pub input_queue: DropOldestQueue<RawDatagram>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/archives", get(list_archives))
        .route("/api/archive/:date/:filename", get(read_archive))
        .route("/api/stats", get(stats))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

async fn list_archives(State(state): State<AppState>) -> impl IntoResponse {
    match state.archive_reader.list_archives().await {
        Ok(entries) => Json(entries).into_response(),
        Err(error) => {
            warn!(%error, "failed to list archives");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn read_archive(
    State(state): State<AppState>,
    Path((date, filename)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.archive_reader.read_archive(&date, &filename).await {
        Ok(result) => {
            if result.skipped > 0 {
                state
                    .counters
                    .archive_skipped_records
                    .fetch_add(result.skipped, Ordering::Relaxed);
            }
            Json(result.packets).into_response()
        }
        Err(error @ ArchiveError::InvalidPathComponent(_)) => {
            warn!(%date, %filename, %error, "rejected archive path");
            StatusCode::BAD_REQUEST.into_response()
        }
        Err(error) => {
            warn!(%date, %filename, %error, "failed to read archive");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

#[derive(Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    counters: telemetry_core::IngestCountersSnapshot,
    input_queue_drops: u64,
    hub_subscribers: usize,
    hub_dropped_total: u64,
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatsResponse {
        counters: state.counters.snapshot(),
        input_queue_drops: state.input_queue.dropped_count(),
        hub_subscribers: state.hub.subscriber_count().await,
        hub_dropped_total: state.hub.total_dropped().await,
    })
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One live hub subscription per connection. Encode/send failure closes
/// only this connection (§4.7); the adapter reads from the client only to
/// notice a close frame.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let (handle, subscription) = state.hub.subscribe(WS_SUBSCRIPTION_BUFFER_CAPACITY).await;

    loop {
        tokio::select! {
            packet = subscription.recv() => {
                let Some(packet) = packet else { break };
                let line = match packet.to_line() {
                    Ok(line) => line,
                    Err(error) => {
                        warn!(%error, "failed to encode packet for websocket, closing connection");
                        break;
                    }
                };
                if socket.send(Message::Text(line)).await.is_err() {
                    break;
                }
            }
            incoming = timeout(WS_IDLE_POLL, socket.recv()) => {
                match incoming {
                    Ok(None) | Ok(Some(Err(_))) => break,
                    Ok(Some(Ok(Message::Close(_)))) => break,
                    Ok(Some(Ok(_))) => {} // client frames are otherwise ignored
                    Err(_) => {} // idle timeout tick, keep waiting on the hub
                }
            }
        }
    }

    state.hub.unsubscribe(handle).await;
    info!("websocket client disconnected");
}
