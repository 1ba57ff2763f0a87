//! HTTP API for the tracking service.
//!
//! This module provides:
//! - Health and metrics monitoring
//! - The WebSocket tracking channel upgrade
//! - Read-only views of tracking history and carrier positions

use axum::{
    Json, Router,
    extract::{ConnectInfo, State, WebSocketUpgrade},
    http::{Extensions, HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::service::TrackingService;
use crate::websocket::handle_ws_connection;

pub mod tracking;
use tracking::{carrier_locations_handler, load_updates_handler};

/// Shared application state
pub struct AppState {
    pub service: Arc<TrackingService>,
    pub start_time: Instant,
    pub metrics: Option<PrometheusHandle>,
}

/// Create the API router
pub fn router(service: Arc<TrackingService>, metrics: Option<PrometheusHandle>) -> Router {
    let ws_path = service.tracking.path.clone();

    let state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
        metrics,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/loads/{id}/updates", get(load_updates_handler))
        .route("/carriers/locations", get(carrier_locations_handler));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route(&ws_path, get(ws_handler))
        .nest("/api", api_routes)
        .fallback(fallback_handler)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Health & Metrics ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        connections: state.service.registry.connection_count(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    connections: usize,
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// === WebSocket ===

async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    extensions: Extensions,
    State(state): State<Arc<AppState>>,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());

    if let Some(origin) = origin
        && !state.service.tracking.origin_allowed(origin)
    {
        warn!(origin, "Rejected tracking connection from disallowed origin");
        return StatusCode::FORBIDDEN.into_response();
    }

    let remote_addr = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    info!(remote_addr = ?remote_addr, "Tracking upgrade request received");

    let service = state.service.clone();
    ws.on_upgrade(move |socket| handle_ws_connection(socket, remote_addr, service))
}

/// Anything unrouted. Upgrade attempts are refused and the connection closed.
async fn fallback_handler(headers: HeaderMap) -> Response {
    let is_upgrade = headers
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"));

    if is_upgrade {
        debug!("Refusing WebSocket upgrade on unknown path");
        return (StatusCode::NOT_FOUND, [(header::CONNECTION, "close")]).into_response();
    }

    StatusCode::NOT_FOUND.into_response()
}
