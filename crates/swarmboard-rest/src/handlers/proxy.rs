//! Passthrough endpoints for the metrics backend and the load engine.

use axum::{
    extract::{Query, State},
    Json,
};
use serde_json::Value;
use swarmboard_core::StatsSnapshot;

use crate::error::ApiError;
use crate::state::AppState;

/// Relays the query string to the metrics backend and its response body verbatim.
pub async fn metrics_query(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Value>, ApiError> {
    state
        .metrics_backend
        .query(&params)
        .await
        .map(Json)
        .map_err(ApiError::upstream)
}

pub async fn engine_stats(State(state): State<AppState>) -> Result<Json<StatsSnapshot>, ApiError> {
    state
        .coordinator
        .engine_snapshot()
        .await
        .map(Json)
        .map_err(ApiError::upstream)
}
