use std::sync::Arc;

use swarmboard_core::MetricsBackend;
use swarmboard_service::{EventBus, RunCoordinator};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RunCoordinator>,
    pub metrics_backend: Arc<dyn MetricsBackend>,
}

impl AppState {
    pub fn new(coordinator: Arc<RunCoordinator>, metrics_backend: Arc<dyn MetricsBackend>) -> Self {
        Self {
            coordinator,
            metrics_backend,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        self.coordinator.bus()
    }
}
