//! Run lifecycle coordinator.
//!
//! Owns the single in-flight run: starts it on the engine, watches it through a
//! [`RunMonitor`], detects termination (operator stop or autonomous completion) and writes
//! the final metrics exactly once. The conditional update in the run store is the terminal
//! guard, so whichever path reaches it first wins and the other becomes a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use swarmboard_core::metrics::{RUNS_FINISHED, RUNS_STARTED, START_REJECTIONS};
use swarmboard_core::{
    CoreError, CoreResult, DashboardEvent, LoadEngine, RunConfig, RunId, RunMetrics, RunRecord,
    RunRepository, RunStatus, ScenarioDefinition, ScenarioPublisher, ScenarioStepInput,
    StatsSnapshot,
};
use tracing::{debug, error, info, warn};

use crate::events::EventBus;
use crate::monitor::{MonitorHandle, RunMonitor, SnapshotHandler};

/// The running run together with the engine's live stats, if it answered.
#[derive(Debug, Clone)]
pub struct CurrentRun {
    pub run: RunRecord,
    pub stats: Option<StatsSnapshot>,
}

pub struct RunCoordinator {
    repository: Arc<dyn RunRepository>,
    engine: Arc<dyn LoadEngine>,
    scenarios: Arc<dyn ScenarioPublisher>,
    monitor: Arc<dyn RunMonitor>,
    bus: Arc<EventBus>,
    /// Serializes start requests across the conflict check, launch and insert.
    start_lock: tokio::sync::Mutex<()>,
    /// Monitor of the run currently being watched.
    active: Mutex<Option<MonitorHandle>>,
    /// Set by [`RunCoordinator::shutdown`]; no monitor is started afterwards.
    closed: AtomicBool,
    this: Weak<RunCoordinator>,
}

impl RunCoordinator {
    pub fn new(
        repository: Arc<dyn RunRepository>,
        engine: Arc<dyn LoadEngine>,
        scenarios: Arc<dyn ScenarioPublisher>,
        monitor: Arc<dyn RunMonitor>,
        bus: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            repository,
            engine,
            scenarios,
            monitor,
            bus,
            start_lock: tokio::sync::Mutex::new(()),
            active: Mutex::new(None),
            closed: AtomicBool::new(false),
            this: this.clone(),
        })
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Starts a new run.
    ///
    /// Input is validated and the conflict check done before anything is written or
    /// launched. A launch failure leaves the store untouched. An insert failure after a
    /// successful launch leaves the engine running untracked and is returned as
    /// `Persistence`.
    pub async fn start_run(
        &self,
        config: RunConfig,
        steps: Vec<ScenarioStepInput>,
    ) -> CoreResult<RunRecord> {
        let definition = ScenarioDefinition::from_inputs(steps)
            .and_then(|definition| config.validate().map(|()| definition))
            .inspect_err(|_| START_REJECTIONS.with_label_values(&["validation"]).inc())?;

        let _guard = self.start_lock.lock().await;

        if let Some(running) = self.repository.get_running().await? {
            START_REJECTIONS.with_label_values(&["conflict"]).inc();
            return Err(CoreError::conflict(format!(
                "run {} ({}) is already in progress",
                running.id,
                running.name()
            )));
        }

        self.scenarios.publish(&definition).await?;

        if let Err(err) = self.engine.launch(&config).await {
            START_REJECTIONS.with_label_values(&["engine"]).inc();
            warn!(name = %config.name, "Engine launch failed: {}", err);
            return Err(err);
        }

        let record = match self.repository.insert(&config, Utc::now()).await {
            Ok(record) => record,
            Err(err) => {
                error!(
                    name = %config.name,
                    target = %config.target_url,
                    "Run launched on the engine but could not be recorded: {}",
                    err
                );
                return Err(CoreError::persistence(format!(
                    "run launched but not recorded: {err}"
                )));
            }
        };

        self.begin_monitoring(record.id);
        self.bus.broadcast(&DashboardEvent::RunStarted {
            test_id: record.id,
            name: record.name().to_string(),
        });
        RUNS_STARTED.inc();

        info!(
            run_id = %record.id,
            name = %record.name(),
            users = record.config.users,
            spawn_rate = record.config.spawn_rate,
            duration_secs = record.config.duration_secs,
            "Run started"
        );
        Ok(record)
    }

    /// Stops the running run.
    ///
    /// Polling ends before the engine is halted. The halt is best-effort: the run is marked `stopped`
    /// even when the engine cannot confirm it. Returns the stopped run's id, or `Conflict`
    /// when the run finished on its own before the stop was recorded.
    pub async fn stop_run(&self) -> CoreResult<RunId> {
        let running = self
            .repository
            .get_running()
            .await?
            .ok_or_else(|| CoreError::not_found("run", "current"))?;

        self.release_monitor(running.id);

        let halted = match self.engine.halt().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(run_id = %running.id, "Engine halt failed, stopping run locally: {}", err);
                None
            }
        };

        if !self.terminate(running.id, RunStatus::Stopped, halted).await? {
            return Err(CoreError::conflict(format!(
                "run {} had already finished",
                running.id
            )));
        }
        Ok(running.id)
    }

    /// Ends a run at most once.
    ///
    /// Returns whether this call performed the transition.
    async fn terminate(
        &self,
        run_id: RunId,
        status: RunStatus,
        snapshot: Option<StatsSnapshot>,
    ) -> CoreResult<bool> {
        let event = match status {
            RunStatus::Completed => DashboardEvent::RunCompleted { test_id: run_id },
            RunStatus::Stopped => DashboardEvent::RunStopped { test_id: run_id },
            RunStatus::Running | RunStatus::Failed => {
                return Err(CoreError::validation(format!(
                    "run {run_id} cannot be ended as {}",
                    status.as_str()
                )));
            }
        };

        self.release_monitor(run_id);

        let snapshot = match snapshot {
            Some(snapshot) => Some(snapshot),
            None => match self.engine.snapshot().await {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    debug!(run_id = %run_id, "No final snapshot available: {}", err);
                    None
                }
            },
        };
        let metrics = snapshot.as_ref().and_then(RunMetrics::from_snapshot);

        let updated = self
            .repository
            .update_terminal(run_id, status, Utc::now(), metrics.as_ref())
            .await?;
        if !updated {
            debug!(run_id = %run_id, status = status.as_str(), "Run already terminal");
            return Ok(false);
        }

        self.bus.broadcast(&event);
        RUNS_FINISHED.with_label_values(&[status.as_str()]).inc();

        info!(
            run_id = %run_id,
            status = status.as_str(),
            total_requests = metrics.as_ref().map(|m| m.total_requests),
            error_rate = metrics.as_ref().map(|m| m.error_rate),
            "Run finished"
        );
        Ok(true)
    }

    /// The running run with best-effort live stats.
    pub async fn current_run(&self) -> CoreResult<Option<CurrentRun>> {
        let Some(run) = self.repository.get_running().await? else {
            return Ok(None);
        };
        let stats = self.engine.snapshot().await.ok();
        Ok(Some(CurrentRun { run, stats }))
    }

    /// Every run, most recent start first.
    pub async fn history(&self) -> CoreResult<Vec<RunRecord>> {
        self.repository.list_all().await
    }

    pub async fn get_run(&self, run_id: RunId) -> CoreResult<RunRecord> {
        self.repository
            .get(run_id)
            .await?
            .ok_or_else(|| CoreError::not_found("run", run_id.to_string()))
    }

    /// Engine stats, passed through.
    pub async fn engine_snapshot(&self) -> CoreResult<StatsSnapshot> {
        self.engine.snapshot().await
    }

    /// Resumes watching a run left `running` by a previous process.
    pub async fn recover(&self) -> CoreResult<Option<RunId>> {
        let Some(running) = self.repository.get_running().await? else {
            return Ok(None);
        };
        info!(run_id = %running.id, name = %running.name(), "Resuming monitoring of unfinished run");
        self.begin_monitoring(running.id);
        Ok(Some(running.id))
    }

    /// Stops monitoring without touching the store.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.active.lock().take() {
            handle.cancel();
            info!(run_id = %handle.run_id(), "Monitoring cancelled for shutdown");
        }
    }

    /// Id of the run being monitored, if any.
    pub fn active_run(&self) -> Option<RunId> {
        self.active
            .lock()
            .as_ref()
            .filter(|handle| !handle.is_cancelled())
            .map(MonitorHandle::run_id)
    }

    fn handler(&self) -> Arc<dyn SnapshotHandler> {
        Arc::new(CoordinatorHandler {
            coordinator: self.this.clone(),
        })
    }

    fn begin_monitoring(&self, run_id: RunId) {
        let handle = self.monitor.watch(run_id, self.handler());
        if let Some(previous) = self.active.lock().replace(handle) {
            previous.cancel();
        }
    }

    /// Watches `run_id` again if nothing else took the slot in the meantime.
    fn restore_monitor(&self, run_id: RunId) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let mut active = self.active.lock();
        if active.is_some() {
            return false;
        }
        *active = Some(self.monitor.watch(run_id, self.handler()));
        true
    }

    fn release_monitor(&self, run_id: RunId) {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|h| h.run_id() == run_id) {
            if let Some(handle) = active.take() {
                handle.cancel();
            }
        }
    }

    /// Runs `f` only while `run_id` is the monitored run, holding the slot lock.
    fn while_monitored(&self, run_id: RunId, f: impl FnOnce()) -> bool {
        let active = self.active.lock();
        match active.as_ref() {
            Some(handle) if handle.run_id() == run_id && !handle.is_cancelled() => {
                f();
                true
            }
            _ => false,
        }
    }

    async fn handle_snapshot(&self, run_id: RunId, snapshot: StatsSnapshot) {
        let current = self.while_monitored(run_id, || {
            self.bus.broadcast(&DashboardEvent::StatsUpdate {
                stats: snapshot.clone(),
            });
        });
        if !current || !snapshot.engine_finished() {
            return;
        }

        debug!(run_id = %run_id, state = %snapshot.state, "Engine reports run finished");
        if let Err(err) = self
            .terminate(run_id, RunStatus::Completed, Some(snapshot))
            .await
        {
            let resumed = self.restore_monitor(run_id);
            error!(
                run_id = %run_id,
                resumed,
                "Failed to record run completion: {}",
                err
            );
        }
    }

    fn handle_poll_failure(&self, run_id: RunId, err: CoreError) {
        let message = err.to_string();
        let current = self.while_monitored(run_id, || {
            self.bus.broadcast(&DashboardEvent::EngineUnreachable {
                message: message.clone(),
            });
        });
        if current {
            warn!(run_id = %run_id, "Engine unreachable during poll: {}", message);
        }
    }
}

/// Feeds monitor observations back into the coordinator without keeping it alive.
struct CoordinatorHandler {
    coordinator: Weak<RunCoordinator>,
}

#[async_trait]
impl SnapshotHandler for CoordinatorHandler {
    async fn on_snapshot(&self, run_id: RunId, snapshot: StatsSnapshot) {
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.handle_snapshot(run_id, snapshot).await;
        }
    }

    async fn on_poll_failure(&self, run_id: RunId, error: CoreError) {
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.handle_poll_failure(run_id, error);
        }
    }
}
