//! Liveness and self-metrics endpoints.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use serde_json::json;

use crate::state::AppState;

/// Liveness probe, with observer count and whether a run is being monitored.
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "observers": state.bus().observer_count(),
        "running": state.coordinator.active_run().is_some(),
    }))
}

/// Prometheus text exposition of the coordinator's own counters.
pub async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        swarmboard_core::metrics::export_prometheus(),
    )
}
