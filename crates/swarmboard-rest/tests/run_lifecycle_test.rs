//! End-to-end run lifecycle over HTTP with the SQLite run store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use chrono::Utc;
use swarmboard_core::{RunId, RunRepository, RunStatus, StatsEntry, StatsSnapshot};
use swarmboard_metadata::{create_sqlite_pool, run_migrations, SqliteRunRepository};
use swarmboard_service::testing::run_config;
use uuid::Uuid;

use common::{app_with_repository, send, start_body};

async fn sqlite_repository() -> Arc<SqliteRunRepository> {
    let path = std::env::temp_dir().join(format!("swarmboard-rest-test-{}.db", Uuid::new_v4()));
    let pool = create_sqlite_pool(
        &format!("sqlite://{}", path.display()),
        4,
        Duration::from_secs(5),
    )
    .await
    .expect("failed to create pool");
    run_migrations(&pool).await.expect("failed migrations");
    Arc::new(SqliteRunRepository::new(pool))
}

fn snapshot(state: &str) -> StatsSnapshot {
    StatsSnapshot::new(
        state,
        vec![
            StatsEntry::new("/", 50, 0, 120.0, 5.0),
            StatsEntry::new("Aggregated", 50, 0, 120.0, 5.0),
        ],
    )
}

#[tokio::test]
async fn start_stop_and_history_smoke() {
    let repository = sqlite_repository().await;
    let app = app_with_repository(repository, Duration::from_millis(50));
    let mut events = app.coordinator.bus().subscribe();
    app.engine.set_snapshot(snapshot("running"));

    let (status, body) = send(&app.router, "POST", "/api/tests/start", Some(start_body("smoke"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["testId"], 1);

    // Wait for at least one poll.
    let mut kinds = Vec::new();
    while !kinds.contains(&"stats-update".to_string()) {
        let raw = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("no stats update")
            .unwrap();
        let event: serde_json::Value = serde_json::from_str(&raw).unwrap();
        kinds.push(event["type"].as_str().unwrap().to_string());
    }
    assert_eq!(kinds[0], "run-started");

    let (status, _) = send(&app.router, "POST", "/api/tests/stop", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, rows) = send(&app.router, "GET", "/api/tests/history", None).await;
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["status"], "stopped");
    assert_eq!(rows[0]["avg_response_time"], 120.0);
    assert_eq!(rows[0]["requests_per_second"], 5.0);
    assert_eq!(rows[0]["error_rate"], 0.0);
    assert_eq!(rows[0]["total_requests"], 50);

    // Exactly one terminal event, and nothing after it.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let mut rest = Vec::new();
    while let Some(raw) = events.try_recv() {
        let event: serde_json::Value = serde_json::from_str(&raw).unwrap();
        rest.push(event["type"].as_str().unwrap().to_string());
    }
    let terminal: Vec<_> = rest
        .iter()
        .filter(|kind| *kind == "run-stopped" || *kind == "run-completed")
        .collect();
    assert_eq!(terminal, vec!["run-stopped"]);
    assert_eq!(rest.last().map(String::as_str), Some("run-stopped"));
}

#[tokio::test]
async fn autonomous_completion_is_persisted() {
    let repository = sqlite_repository().await;
    let app = app_with_repository(repository.clone(), Duration::from_millis(50));
    app.engine.set_snapshot(snapshot("stopped"));

    send(&app.router, "POST", "/api/tests/start", Some(start_body("auto"))).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let run = repository.get(RunId::new(1)).await.unwrap().unwrap();
        if run.status == RunStatus::Completed {
            assert_eq!(run.metrics.unwrap().total_requests, 50);
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "run never completed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // A stop after completion finds nothing to stop.
    let (status, _) = send(&app.router, "POST", "/api/tests/stop", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn recover_picks_up_run_left_running() {
    let repository = sqlite_repository().await;
    repository
        .insert(&run_config("before restart"), Utc::now())
        .await
        .unwrap();

    let app = app_with_repository(repository.clone(), Duration::from_millis(50));
    app.engine.set_snapshot(snapshot("stopped"));

    assert_eq!(app.coordinator.recover().await.unwrap(), Some(RunId::new(1)));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while repository.get_running().await.unwrap().is_some() {
        assert!(tokio::time::Instant::now() < deadline, "recovered run never completed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let run = repository.get(RunId::new(1)).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
}
