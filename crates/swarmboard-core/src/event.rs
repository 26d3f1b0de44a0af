use serde::Serialize;

use crate::ids::RunId;
use crate::stats::StatsSnapshot;

/// Messages pushed to every connected observer.
///
/// Serialized as JSON objects discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DashboardEvent {
    /// Sent once to a freshly connected observer.
    Connection { status: String },
    #[serde(rename_all = "camelCase")]
    RunStarted { test_id: RunId, name: String },
    StatsUpdate { stats: StatsSnapshot },
    #[serde(rename_all = "camelCase")]
    RunCompleted { test_id: RunId },
    #[serde(rename_all = "camelCase")]
    RunStopped { test_id: RunId },
    /// A poll tick could not reach the engine; the run is presumed still active.
    EngineUnreachable { message: String },
}

impl DashboardEvent {
    /// Greeting for a new observer.
    #[must_use]
    pub fn connected() -> Self {
        Self::Connection {
            status: "connected".to_string(),
        }
    }

    /// The `type` discriminator, for logs and metric labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::RunStarted { .. } => "run-started",
            Self::StatsUpdate { .. } => "stats-update",
            Self::RunCompleted { .. } => "run-completed",
            Self::RunStopped { .. } => "run-stopped",
            Self::EngineUnreachable { .. } => "engine-unreachable",
        }
    }

    /// Whether this event closes a run's event sequence.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::RunCompleted { .. } | Self::RunStopped { .. })
    }
}
