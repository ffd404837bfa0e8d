//! 🌐 The HTTP front desk.
//!
//! - `POST /events`: NDJSON (optionally gzipped) → decode → enrich → enqueue, one
//!   record at a time, waiting out backpressure. `200 OK` once every record is queued.
//! - `GET /health`: the pool's [`HealthSnapshot`](crate::HealthSnapshot) as JSON.
//!   `503` when no flush worker is left alive, so "the queue is full because
//!   it's busy" and "the queue is full because everyone is dead" look different.

use std::future::Future;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::decode::{DecodeError, decode_body, maybe_gunzip, peer_ipv4, server_now};
use crate::queue::IngestionQueue;
use crate::supervisors::PoolHealth;

/// 🧳 What every handler gets handed. Cheap to clone: it's all handles.
#[derive(Debug, Clone)]
pub struct AppState {
    pub queue: IngestionQueue,
    pub health: PoolHealth,
    pub max_body_bytes: usize,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/events", post(ingest_events))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .with_state(state)
}

fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("gzip"))
}

async fn ingest_events(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let decoded = maybe_gunzip(&body, is_gzip(&headers), state.max_body_bytes)
        .and_then(|body| decode_body(&body));
    let payloads = match decoded {
        Ok(payloads) => payloads,
        Err(e @ DecodeError::TooLarge { .. }) => {
            return (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response();
        }
        Err(e) => {
            debug!(%peer, "🙅 rejected request body: {e}");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let server_time = server_now();
    let ip = peer_ipv4(peer.ip());
    let total = payloads.len();
    for (queued, payload) in payloads.into_iter().enumerate() {
        if let Err(e) = state.queue.enqueue(payload.into_record(server_time, ip)).await {
            warn!(%peer, queued, total, "🚪 request cut short: {e}");
            return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
        }
    }
    debug!(%peer, records = total, "📥 request enqueued");
    (StatusCode::OK, "OK").into_response()
}

async fn health_check(State(state): State<AppState>) -> Response {
    let snapshot = state.health.snapshot();
    let status = if snapshot.is_serving() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(snapshot)).into_response()
}

/// 🚀 Serve until `shutdown` resolves, then finish in-flight requests and return.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let local_addr = listener
        .local_addr()
        .context("💀 listener has no local address. Where are we, even?")?;
    info!(%local_addr, "🌐 accepting events");

    let app = build_router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("💀 HTTP server fell over")?;

    info!("🌐 no longer accepting events");
    Ok(())
}
