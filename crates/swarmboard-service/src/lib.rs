//! Service layer for SwarmBoard.
//! Run lifecycle coordination shared by the REST and WebSocket surfaces.

mod config;
mod coordinator;
pub mod engine;
pub mod events;
pub mod monitor;
mod scenario_file;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{
    Config, ConfigError, DatabaseConfig, EngineConfig, LoggingConfig, ServerConfig,
    DEFAULT_CONFIG_FILE,
};
pub use coordinator::{CurrentRun, RunCoordinator};
pub use engine::{build_http_client, LocustClient, PrometheusClient};
pub use events::{EventBus, EventStream, ObserverId};
pub use monitor::{MonitorHandle, PollingMonitor, RunMonitor, SnapshotHandler};
pub use scenario_file::ScenarioFile;
