use std::path::PathBuf;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use swarmboard_core::{CoreError, RunConfig, RunId, RunMetrics, RunRepository, RunStatus};
use swarmboard_metadata::{create_sqlite_pool, run_migrations, SqliteRunRepository};
use uuid::Uuid;

async fn setup_repository() -> SqliteRunRepository {
    let db_path = temp_db_path();
    let database_url = format!("sqlite://{}", db_path.display());
    let pool = create_sqlite_pool(&database_url, 4, Duration::from_secs(5))
        .await
        .expect("failed to create pool");
    run_migrations(&pool).await.expect("failed migrations");
    SqliteRunRepository::new(pool)
}

fn temp_db_path() -> PathBuf {
    let filename = format!("swarmboard-metadata-test-{}.db", Uuid::new_v4());
    std::env::temp_dir().join(filename)
}

fn config(name: &str) -> RunConfig {
    RunConfig {
        name: name.to_string(),
        target_url: "http://x".to_string(),
        users: 10,
        spawn_rate: 2.0,
        duration_secs: 0,
    }
}

fn metrics() -> RunMetrics {
    RunMetrics {
        avg_response_time: 120.0,
        requests_per_second: 5.0,
        error_rate: 0.0,
        total_requests: 50,
        total_failures: 0,
    }
}

#[tokio::test]
async fn insert_assigns_id_and_running_status() {
    let repo = setup_repository().await;
    let started = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

    let run = repo.insert(&config("smoke"), started).await.expect("insert");
    assert_eq!(run.id, RunId::new(1));
    assert_eq!(run.status, RunStatus::Running);

    let fetched = repo.get(run.id).await.expect("get").expect("run present");
    assert_eq!(fetched, run);
    assert!(fetched.end_time.is_none());
    assert!(fetched.metrics.is_none());
}

#[tokio::test]
async fn get_running_returns_active_run() {
    let repo = setup_repository().await;
    assert!(repo.get_running().await.expect("query").is_none());

    let run = repo.insert(&config("smoke"), Utc::now()).await.expect("insert");
    let running = repo.get_running().await.expect("query").expect("running");
    assert_eq!(running.id, run.id);
}

#[tokio::test]
async fn update_terminal_writes_metrics_once() {
    let repo = setup_repository().await;
    let run = repo.insert(&config("smoke"), Utc::now()).await.expect("insert");
    let ended = Utc::now();

    let first = repo
        .update_terminal(run.id, RunStatus::Stopped, ended, Some(&metrics()))
        .await
        .expect("first update");
    assert!(first);

    let second = repo
        .update_terminal(run.id, RunStatus::Completed, Utc::now(), None)
        .await
        .expect("second update");
    assert!(!second, "a terminal run must not be updated again");

    let stored = repo.get(run.id).await.expect("get").expect("present");
    assert_eq!(stored.status, RunStatus::Stopped);
    assert_eq!(stored.metrics, Some(metrics()));
    assert!(stored.end_time.is_some());
    assert!(repo.get_running().await.expect("query").is_none());
}

#[tokio::test]
async fn update_terminal_without_metrics_leaves_them_unset() {
    let repo = setup_repository().await;
    let run = repo.insert(&config("no-stats"), Utc::now()).await.expect("insert");

    assert!(repo
        .update_terminal(run.id, RunStatus::Completed, Utc::now(), None)
        .await
        .expect("update"));

    let stored = repo.get(run.id).await.expect("get").expect("present");
    assert_eq!(stored.status, RunStatus::Completed);
    assert!(stored.metrics.is_none());
}

#[tokio::test]
async fn update_terminal_unknown_run_matches_nothing() {
    let repo = setup_repository().await;
    let updated = repo
        .update_terminal(RunId::new(99), RunStatus::Stopped, Utc::now(), None)
        .await
        .expect("update");
    assert!(!updated);
}

#[tokio::test]
async fn update_terminal_rejects_running_status() {
    let repo = setup_repository().await;
    let run = repo.insert(&config("smoke"), Utc::now()).await.expect("insert");

    let err = repo
        .update_terminal(run.id, RunStatus::Running, Utc::now(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn second_running_row_is_a_conflict() {
    let repo = setup_repository().await;
    repo.insert(&config("first"), Utc::now()).await.expect("insert");

    let err = repo
        .insert(&config("second"), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    assert_eq!(repo.list_all().await.expect("list").len(), 1);
}

#[tokio::test]
async fn list_all_is_most_recent_first() {
    let repo = setup_repository().await;

    let older = repo
        .insert(&config("before"), Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
        .await
        .expect("insert older");
    repo.update_terminal(older.id, RunStatus::Completed, Utc::now(), Some(&metrics()))
        .await
        .expect("finish older");

    let newer = repo
        .insert(&config("after"), Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap())
        .await
        .expect("insert newer");

    let runs = repo.list_all().await.expect("list");
    let ids: Vec<RunId> = runs.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![newer.id, older.id]);
    assert_eq!(runs[1].name(), "before");
}
