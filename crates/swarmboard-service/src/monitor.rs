//! Run monitoring.
//!
//! The engine offers no completion notification, so [`PollingMonitor`] fetches a snapshot
//! on a fixed period and hands it to a [`SnapshotHandler`], which infers completion. A
//! push-based engine integration would implement [`RunMonitor`] and feed the same handler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use swarmboard_core::metrics::POLL_TICKS;
use swarmboard_core::{CoreError, LoadEngine, RunId, StatsSnapshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Receives what a monitor observes about one run.
#[async_trait]
pub trait SnapshotHandler: Send + Sync {
    async fn on_snapshot(&self, run_id: RunId, snapshot: StatsSnapshot);

    /// The engine could not be reached. Monitoring continues.
    async fn on_poll_failure(&self, run_id: RunId, error: CoreError);
}

/// Starts watching a run until the returned handle is cancelled.
pub trait RunMonitor: Send + Sync {
    fn watch(&self, run_id: RunId, handler: Arc<dyn SnapshotHandler>) -> MonitorHandle;
}

/// Cancellation handle for one monitored run.
#[derive(Debug)]
pub struct MonitorHandle {
    run_id: RunId,
    cancel: CancellationToken,
}

impl MonitorHandle {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            cancel: CancellationToken::new(),
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Token the monitor task watches; cancelled by [`MonitorHandle::cancel`].
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops the monitor. Calls already in flight finish, their results are discarded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Polls the engine's stats endpoint on a fixed period.
pub struct PollingMonitor {
    engine: Arc<dyn LoadEngine>,
    period: Duration,
}

impl PollingMonitor {
    pub fn new(engine: Arc<dyn LoadEngine>, period: Duration) -> Self {
        Self { engine, period }
    }
}

impl RunMonitor for PollingMonitor {
    fn watch(&self, run_id: RunId, handler: Arc<dyn SnapshotHandler>) -> MonitorHandle {
        let handle = MonitorHandle::new(run_id);
        let cancel = handle.token();
        let engine = Arc::clone(&self.engine);
        let period = self.period;

        tokio::spawn(async move {
            info!(run_id = %run_id, period_ms = period.as_millis() as u64, "poll loop started");

            // First tick one period after start, like a plain interval timer.
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let result = engine.snapshot().await;
                if cancel.is_cancelled() {
                    debug!(run_id = %run_id, "discarding poll result after cancellation");
                    break;
                }

                match result {
                    Ok(snapshot) => {
                        POLL_TICKS.with_label_values(&["ok"]).inc();
                        handler.on_snapshot(run_id, snapshot).await;
                    }
                    Err(err) => {
                        POLL_TICKS.with_label_values(&["unreachable"]).inc();
                        handler.on_poll_failure(run_id, err).await;
                    }
                }
            }

            info!(run_id = %run_id, "poll loop stopped");
        });

        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedEngine;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        snapshots: Mutex<Vec<(RunId, String)>>,
        failures: Mutex<Vec<RunId>>,
    }

    #[async_trait]
    impl SnapshotHandler for Recorder {
        async fn on_snapshot(&self, run_id: RunId, snapshot: StatsSnapshot) {
            self.snapshots.lock().push((run_id, snapshot.state));
        }

        async fn on_poll_failure(&self, run_id: RunId, _error: CoreError) {
            self.failures.lock().push(run_id);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_every_period_until_cancelled() {
        let engine = Arc::new(ScriptedEngine::default());
        engine.set_snapshot(StatsSnapshot::new("running", vec![]));
        let monitor = PollingMonitor::new(engine.clone(), Duration::from_secs(2));
        let recorder = Arc::new(Recorder::default());

        let handle = monitor.watch(RunId::new(1), recorder.clone());

        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert!(recorder.snapshots.lock().is_empty(), "no tick before the first period");

        tokio::time::sleep(Duration::from_millis(4200)).await;
        assert_eq!(recorder.snapshots.lock().len(), 3);

        handle.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(recorder.snapshots.lock().len(), 3);
        assert_eq!(engine.snapshot_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failures_do_not_stop_the_loop() {
        let engine = Arc::new(ScriptedEngine::default());
        engine.set_snapshot_unavailable(true);
        let monitor = PollingMonitor::new(engine.clone(), Duration::from_secs(2));
        let recorder = Arc::new(Recorder::default());

        let handle = monitor.watch(RunId::new(5), recorder.clone());
        tokio::time::sleep(Duration::from_millis(4100)).await;
        assert_eq!(*recorder.failures.lock(), vec![RunId::new(5), RunId::new(5)]);

        engine.set_snapshot_unavailable(false);
        engine.set_snapshot(StatsSnapshot::new("running", vec![]));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(recorder.snapshots.lock().len(), 1);

        handle.cancel();
    }
}
