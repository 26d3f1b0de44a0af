//! In-memory collaborators for exercising the coordinator without Locust or SQLite.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use swarmboard_core::{
    CoreError, CoreResult, LoadEngine, MetricsBackend, RunConfig, RunId, RunMetrics, RunRecord,
    RunRepository, RunStatus, ScenarioDefinition, ScenarioPublisher, StatsEntry, StatsSnapshot,
};

/// Snapshot with an `Aggregated` entry, the shape the engine reports.
pub fn snapshot(state: &str, requests: u64, failures: u64, avg: f64, rps: f64) -> StatsSnapshot {
    StatsSnapshot::new(
        state,
        vec![
            StatsEntry::new("/", requests, failures, avg, rps),
            StatsEntry::new("Aggregated", requests, failures, avg, rps),
        ],
    )
}

/// Run settings accepted by validation.
pub fn run_config(name: &str) -> RunConfig {
    RunConfig {
        name: name.to_string(),
        target_url: "http://target.local".to_string(),
        users: 10,
        spawn_rate: 2.0,
        duration_secs: 0,
    }
}

/// Engine double answering from a script.
///
/// `snapshot()` pops queued results first and falls back to the fixed snapshot.
#[derive(Default)]
pub struct ScriptedEngine {
    queued: Mutex<VecDeque<CoreResult<StatsSnapshot>>>,
    fixed: Mutex<Option<StatsSnapshot>>,
    halt_snapshot: Mutex<Option<StatsSnapshot>>,
    snapshot_delay: Mutex<Option<Duration>>,
    halt_delay: Mutex<Option<Duration>>,
    snapshot_unavailable: AtomicBool,
    fail_launch: AtomicBool,
    fail_halt: AtomicBool,
    launches: Mutex<Vec<RunConfig>>,
    halts: AtomicUsize,
    snapshot_calls: AtomicUsize,
}

impl ScriptedEngine {
    pub fn set_snapshot(&self, snapshot: StatsSnapshot) {
        *self.fixed.lock() = Some(snapshot);
    }

    pub fn push_snapshot(&self, result: CoreResult<StatsSnapshot>) {
        self.queued.lock().push_back(result);
    }

    /// Snapshot handed back by `halt()`.
    pub fn set_halt_snapshot(&self, snapshot: StatsSnapshot) {
        *self.halt_snapshot.lock() = Some(snapshot);
    }

    /// Makes each `snapshot()` call take `delay` before answering.
    pub fn set_snapshot_delay(&self, delay: Duration) {
        *self.snapshot_delay.lock() = Some(delay);
    }

    /// Makes `halt()` take `delay` before answering.
    pub fn set_halt_delay(&self, delay: Duration) {
        *self.halt_delay.lock() = Some(delay);
    }

    pub fn set_snapshot_unavailable(&self, unavailable: bool) {
        self.snapshot_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_fail_launch(&self, fail: bool) {
        self.fail_launch.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_halt(&self, fail: bool) {
        self.fail_halt.store(fail, Ordering::SeqCst);
    }

    pub fn launches(&self) -> Vec<RunConfig> {
        self.launches.lock().clone()
    }

    pub fn halts(&self) -> usize {
        self.halts.load(Ordering::SeqCst)
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LoadEngine for ScriptedEngine {
    async fn launch(&self, config: &RunConfig) -> CoreResult<()> {
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(CoreError::engine_unavailable("connection refused"));
        }
        self.launches.lock().push(config.clone());
        Ok(())
    }

    async fn halt(&self) -> CoreResult<Option<StatsSnapshot>> {
        self.halts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.halt_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_halt.load(Ordering::SeqCst) {
            return Err(CoreError::engine_unavailable("connection refused"));
        }
        Ok(self.halt_snapshot.lock().clone())
    }

    async fn snapshot(&self) -> CoreResult<StatsSnapshot> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.snapshot_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(result) = self.queued.lock().pop_front() {
            return result;
        }
        if self.snapshot_unavailable.load(Ordering::SeqCst) {
            return Err(CoreError::engine_unavailable("connection refused"));
        }
        self.fixed
            .lock()
            .clone()
            .ok_or_else(|| CoreError::engine_unavailable("no snapshot scripted"))
    }
}

/// Publisher that keeps every definition in memory.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<ScenarioDefinition>>,
    fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<ScenarioDefinition> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl ScenarioPublisher for RecordingPublisher {
    async fn publish(&self, definition: &ScenarioDefinition) -> CoreResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only file system",
            )));
        }
        self.published.lock().push(definition.clone());
        Ok(())
    }
}

/// Run store kept in a vector, with the same single-running and conditional-update rules
/// as the SQLite schema.
#[derive(Default)]
pub struct MemoryRunRepository {
    runs: Mutex<Vec<RunRecord>>,
    fail_insert: AtomicBool,
    fail_update: AtomicBool,
}

impl MemoryRunRepository {
    pub fn set_fail_insert(&self, fail: bool) {
        self.fail_insert.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    /// Seeds a record as if a previous process had written it.
    pub fn seed(&self, record: RunRecord) {
        self.runs.lock().push(record);
    }

    pub fn records(&self) -> Vec<RunRecord> {
        self.runs.lock().clone()
    }
}

#[async_trait]
impl RunRepository for MemoryRunRepository {
    async fn insert(&self, config: &RunConfig, start_time: DateTime<Utc>) -> CoreResult<RunRecord> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(CoreError::persistence("database is locked"));
        }

        let mut runs = self.runs.lock();
        if runs.iter().any(RunRecord::is_running) {
            return Err(CoreError::conflict("a run is already recorded as running"));
        }
        let next = runs.iter().map(|r| r.id.get()).max().unwrap_or(0) + 1;
        let record = RunRecord {
            id: RunId::new(next),
            status: RunStatus::Running,
            start_time,
            end_time: None,
            config: config.clone(),
            metrics: None,
        };
        runs.push(record.clone());
        Ok(record)
    }

    async fn update_terminal(
        &self,
        run_id: RunId,
        status: RunStatus,
        end_time: DateTime<Utc>,
        metrics: Option<&RunMetrics>,
    ) -> CoreResult<bool> {
        if !status.is_terminal() {
            return Err(CoreError::validation("terminal status required"));
        }
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(CoreError::persistence("disk I/O error"));
        }

        let mut runs = self.runs.lock();
        match runs
            .iter_mut()
            .find(|r| r.id == run_id && r.status == RunStatus::Running)
        {
            Some(record) => {
                record.status = status;
                record.end_time = Some(end_time);
                record.metrics = metrics.cloned();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_running(&self) -> CoreResult<Option<RunRecord>> {
        Ok(self.runs.lock().iter().find(|r| r.is_running()).cloned())
    }

    async fn get(&self, run_id: RunId) -> CoreResult<Option<RunRecord>> {
        Ok(self.runs.lock().iter().find(|r| r.id == run_id).cloned())
    }

    async fn list_all(&self) -> CoreResult<Vec<RunRecord>> {
        let mut runs = self.runs.lock().clone();
        runs.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.get().cmp(&a.id.get())));
        Ok(runs)
    }
}

/// Metrics backend returning a canned body, or failing when none is set.
#[derive(Default)]
pub struct StaticMetricsBackend {
    response: Mutex<Option<Value>>,
    queries: Mutex<Vec<Vec<(String, String)>>>,
}

impl StaticMetricsBackend {
    pub fn set_response(&self, response: Value) {
        *self.response.lock() = Some(response);
    }

    pub fn queries(&self) -> Vec<Vec<(String, String)>> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl MetricsBackend for StaticMetricsBackend {
    async fn query(&self, params: &[(String, String)]) -> CoreResult<Value> {
        self.queries.lock().push(params.to_vec());
        self.response
            .lock()
            .clone()
            .ok_or_else(|| CoreError::engine_unavailable("metrics backend unreachable"))
    }
}
