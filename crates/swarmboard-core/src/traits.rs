use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::CoreResult;
use crate::ids::RunId;
use crate::run::{RunConfig, RunMetrics, RunRecord, RunStatus};
use crate::scenario::ScenarioDefinition;
use crate::stats::StatsSnapshot;

/// Durable record of every run.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Inserts a new run in status `running` and returns it with its assigned id.
    async fn insert(&self, config: &RunConfig, start_time: DateTime<Utc>) -> CoreResult<RunRecord>;

    /// Moves a run to a terminal status.
    ///
    /// The write only applies if the run is still `running`, checked in the same
    /// statement. Returns whether a row matched.
    async fn update_terminal(
        &self,
        run_id: RunId,
        status: RunStatus,
        end_time: DateTime<Utc>,
        metrics: Option<&RunMetrics>,
    ) -> CoreResult<bool>;

    /// Returns the run currently in status `running`, if any.
    async fn get_running(&self) -> CoreResult<Option<RunRecord>>;

    /// Fetches a run by its identifier.
    async fn get(&self, run_id: RunId) -> CoreResult<Option<RunRecord>>;

    /// Lists every run, most recent start time first.
    async fn list_all(&self) -> CoreResult<Vec<RunRecord>>;
}

/// Control endpoints of the external load-generation engine.
///
/// Every call is a single attempt; failures surface as `EngineUnavailable`.
#[async_trait]
pub trait LoadEngine: Send + Sync {
    /// Starts the swarm against `config.target_url`.
    async fn launch(&self, config: &RunConfig) -> CoreResult<()>;

    /// Halts the swarm. Engines that report final stats with the halt return them.
    async fn halt(&self) -> CoreResult<Option<StatsSnapshot>>;

    /// Fetches the current statistics.
    async fn snapshot(&self) -> CoreResult<StatsSnapshot>;
}

/// External metrics-query backend; responses are relayed verbatim.
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    async fn query(&self, params: &[(String, String)]) -> CoreResult<Value>;
}

/// Destination of the scenario artifact read by the engine at launch.
#[async_trait]
pub trait ScenarioPublisher: Send + Sync {
    /// Replaces the previously published definition.
    async fn publish(&self, definition: &ScenarioDefinition) -> CoreResult<()>;
}
