//! Tracking history and carrier position endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use std::sync::Arc;

use super::AppState;
use crate::db::TrackingUpdateRecord;
use crate::error::ServiceError;
use crate::websocket::ServerMessage;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Most recent history for one load, newest first
pub async fn load_updates_handler(
    State(state): State<Arc<AppState>>,
    Path(load_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<TrackingUpdateRecord>>, ServiceError> {
    let records = state.service.recent_history(load_id, query.limit).await?;
    Ok(Json(records))
}

/// The same payload the periodic snapshot broadcasts
pub async fn carrier_locations_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ServerMessage>, ServiceError> {
    let snapshot = state.service.router.carrier_snapshot().await?;
    Ok(Json(snapshot))
}
