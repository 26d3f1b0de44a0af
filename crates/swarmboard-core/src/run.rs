use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};
use crate::ids::RunId;
use crate::stats::StatsSnapshot;

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The engine is generating load for this run.
    Running,
    /// The engine finished on its own.
    Completed,
    /// An operator stopped the run.
    Stopped,
    /// The run ended abnormally.
    Failed,
}

impl RunStatus {
    /// Returns the canonical lowercase string persisted in SQLite.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    /// Terminal statuses never transition again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl FromStr for RunStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "stopped" => Ok(Self::Stopped),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

/// Campaign settings captured when a run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Display name.
    pub name: String,
    /// Host the engine sends traffic to.
    pub target_url: String,
    /// Number of concurrent simulated users.
    pub users: u32,
    /// Users spawned per second.
    pub spawn_rate: f64,
    /// Planned duration in seconds; `0` runs until stopped.
    pub duration_secs: u64,
}

impl RunConfig {
    /// Checks the settings the engine cannot run without.
    pub fn validate(&self) -> CoreResult<()> {
        if self.target_url.trim().is_empty() {
            return Err(CoreError::validation("target URL is required"));
        }
        if self.users == 0 {
            return Err(CoreError::validation("users must be at least 1"));
        }
        if !self.spawn_rate.is_finite() || self.spawn_rate <= 0.0 {
            return Err(CoreError::validation("spawn rate must be a positive number"));
        }
        Ok(())
    }
}

/// Final aggregated metrics, written once when a run reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub avg_response_time: f64,
    pub requests_per_second: f64,
    /// Failed requests as a percentage of all requests.
    pub error_rate: f64,
    pub total_requests: u64,
    pub total_failures: u64,
}

impl RunMetrics {
    /// Derives final metrics from the `Aggregated` entry of a snapshot.
    ///
    /// Returns `None` when the engine did not report whole-run totals.
    /// Requests per second is read from the entry's `current_rps`.
    #[must_use]
    pub fn from_snapshot(snapshot: &StatsSnapshot) -> Option<Self> {
        let aggregated = snapshot.aggregated()?;
        Some(Self {
            avg_response_time: aggregated.avg_response_time,
            requests_per_second: aggregated.current_rps,
            error_rate: error_rate(aggregated.num_requests, aggregated.num_failures),
            total_requests: aggregated.num_requests,
            total_failures: aggregated.num_failures,
        })
    }
}

/// Failures as a percentage of requests; `0.0` when nothing was sent.
#[must_use]
pub fn error_rate(requests: u64, failures: u64) -> f64 {
    if requests == 0 {
        return 0.0;
    }
    failures as f64 / requests as f64 * 100.0
}

/// One load-testing campaign execution as stored in the run store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    /// Set if and only if `status` is terminal.
    pub end_time: Option<DateTime<Utc>>,
    pub config: RunConfig,
    /// Unset until the run reaches a terminal status (and may stay unset if the engine
    /// never reported totals).
    pub metrics: Option<RunMetrics>,
}

impl RunRecord {
    /// Display name of the run.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Whether the run is still in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }
}
