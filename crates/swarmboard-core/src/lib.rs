//! Core domain types and traits for the SwarmBoard run coordinator.

pub mod error;
pub mod event;
pub mod ids;
pub mod metrics;
pub mod run;
pub mod scenario;
pub mod stats;
pub mod traits;

pub use error::{CoreError, CoreResult};
pub use event::DashboardEvent;
pub use ids::RunId;
pub use run::{error_rate, RunConfig, RunMetrics, RunRecord, RunStatus};
pub use scenario::{ScenarioDefinition, ScenarioStep, ScenarioStepInput};
pub use stats::{StatsEntry, StatsSnapshot, AGGREGATED_ENTRY};
pub use traits::{LoadEngine, MetricsBackend, RunRepository, ScenarioPublisher};
