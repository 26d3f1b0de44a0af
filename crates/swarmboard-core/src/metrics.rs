//! Prometheus metrics for the run coordinator.
//!
//! Metrics are registered lazily on first access using once_cell::Lazy.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

/// Runs accepted by the engine and recorded in the store.
pub static RUNS_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("swarmboard_runs_started_total", "Total number of runs started")
        .expect("Failed to register runs started counter")
});

/// Runs that reached a terminal status, by status.
pub static RUNS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "swarmboard_runs_finished_total",
        "Total number of runs that reached a terminal status",
        &["status"]
    )
    .expect("Failed to register runs finished counter")
});

/// Start requests rejected, by reason (validation, conflict, engine, persistence).
pub static START_REJECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "swarmboard_start_rejections_total",
        "Total number of rejected start requests",
        &["reason"]
    )
    .expect("Failed to register start rejections counter")
});

/// Poll ticks by outcome (ok, unreachable).
pub static POLL_TICKS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "swarmboard_poll_ticks_total",
        "Total number of engine stats polls",
        &["outcome"]
    )
    .expect("Failed to register poll ticks counter")
});

/// Events broadcast to observers, by event type.
pub static EVENTS_BROADCAST: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "swarmboard_events_broadcast_total",
        "Total number of events broadcast to observers",
        &["type"]
    )
    .expect("Failed to register events broadcast counter")
});

/// Currently connected observers.
pub static CONNECTED_OBSERVERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "swarmboard_connected_observers",
        "Number of connected event observers"
    )
    .expect("Failed to register connected observers gauge")
});

/// Renders every registered metric in the Prometheus text format.
#[must_use]
pub fn export_prometheus() -> String {
    use prometheus::Encoder;

    // Touch lazies so they appear even before their first increment.
    Lazy::force(&RUNS_STARTED);
    Lazy::force(&RUNS_FINISHED);
    Lazy::force(&START_REJECTIONS);
    Lazy::force(&POLL_TICKS);
    Lazy::force(&EVENTS_BROADCAST);
    Lazy::force(&CONNECTED_OBSERVERS);

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
