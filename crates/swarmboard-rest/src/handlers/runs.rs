//! Run lifecycle endpoints under `/api/tests`.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use swarmboard_core::{RunConfig, RunId, RunRecord, RunStatus, ScenarioStepInput};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Body of `POST /api/tests/start`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    pub name: String,
    pub target_url: String,
    pub users: u32,
    pub spawn_rate: f64,
    /// Seconds; `0` or absent runs until stopped.
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub scenarios: Vec<ScenarioStepInput>,
}

impl StartRunRequest {
    fn into_parts(self) -> (RunConfig, Vec<ScenarioStepInput>) {
        let config = RunConfig {
            name: self.name,
            target_url: self.target_url,
            users: self.users,
            spawn_rate: self.spawn_rate,
            duration_secs: self.duration,
        };
        (config, self.scenarios)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunResponse {
    pub success: bool,
    pub test_id: RunId,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub success: bool,
    pub message: String,
}

/// A run as one flat history row.
#[derive(Debug, Serialize)]
pub struct RunRow {
    pub id: RunId,
    pub name: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub target_url: String,
    pub users: u32,
    pub spawn_rate: f64,
    pub duration: u64,
    pub avg_response_time: Option<f64>,
    pub requests_per_second: Option<f64>,
    pub error_rate: Option<f64>,
    pub total_requests: Option<u64>,
    pub total_failures: Option<u64>,
}

impl From<RunRecord> for RunRow {
    fn from(record: RunRecord) -> Self {
        let metrics = record.metrics;
        Self {
            id: record.id,
            name: record.config.name,
            status: record.status,
            start_time: record.start_time,
            end_time: record.end_time,
            target_url: record.config.target_url,
            users: record.config.users,
            spawn_rate: record.config.spawn_rate,
            duration: record.config.duration_secs,
            avg_response_time: metrics.as_ref().map(|m| m.avg_response_time),
            requests_per_second: metrics.as_ref().map(|m| m.requests_per_second),
            error_rate: metrics.as_ref().map(|m| m.error_rate),
            total_requests: metrics.as_ref().map(|m| m.total_requests),
            total_failures: metrics.as_ref().map(|m| m.total_failures),
        }
    }
}

/// Start a run.
#[tracing::instrument(skip_all)]
pub async fn start_run(
    State(state): State<AppState>,
    payload: Result<Json<StartRunRequest>, JsonRejection>,
) -> Result<Json<StartRunResponse>, ApiError> {
    let Json(request) = payload?;
    let (config, steps) = request.into_parts();
    info!(name = %config.name, target = %config.target_url, "Start requested");

    let record = state.coordinator.start_run(config, steps).await?;

    Ok(Json(StartRunResponse {
        success: true,
        test_id: record.id,
        message: format!("Run '{}' started", record.name()),
    }))
}

/// Stop the running run.
#[tracing::instrument(skip_all)]
pub async fn stop_run(State(state): State<AppState>) -> Result<Json<AckResponse>, ApiError> {
    let run_id = state.coordinator.stop_run().await?;

    Ok(Json(AckResponse {
        success: true,
        message: format!("Run {run_id} stopped"),
    }))
}

/// The running run with live stats; `stats` is null when the engine does not answer.
pub async fn current_run(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let body = match state.coordinator.current_run().await? {
        Some(current) => json!({
            "running": true,
            "testId": current.run.id,
            "name": current.run.name(),
            "stats": current.stats,
        }),
        None => json!({ "running": false }),
    };
    Ok(Json(body))
}

pub async fn history(State(state): State<AppState>) -> Result<Json<Vec<RunRow>>, ApiError> {
    let runs = state.coordinator.history().await?;
    Ok(Json(runs.into_iter().map(RunRow::from).collect()))
}

pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunRow>, ApiError> {
    let run_id: RunId = id
        .parse()
        .map_err(|_| ApiError::Validation(format!("invalid run id '{id}'")))?;

    let record = state.coordinator.get_run(run_id).await?;
    Ok(Json(RunRow::from(record)))
}
