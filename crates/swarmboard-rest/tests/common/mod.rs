#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use swarmboard_core::RunRepository;
use swarmboard_rest::{build_router, AppState};
use swarmboard_service::testing::{
    MemoryRunRepository, RecordingPublisher, ScriptedEngine, StaticMetricsBackend,
};
use swarmboard_service::{EventBus, PollingMonitor, RunCoordinator};
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub coordinator: Arc<RunCoordinator>,
    pub engine: Arc<ScriptedEngine>,
    pub metrics: Arc<StaticMetricsBackend>,
}

/// App over in-memory doubles.
pub fn app() -> TestApp {
    app_with_repository(Arc::new(MemoryRunRepository::default()), Duration::from_secs(60))
}

pub fn app_with_repository(repository: Arc<dyn RunRepository>, poll: Duration) -> TestApp {
    let engine = Arc::new(ScriptedEngine::default());
    let metrics = Arc::new(StaticMetricsBackend::default());
    let coordinator = RunCoordinator::new(
        repository,
        engine.clone(),
        Arc::new(RecordingPublisher::default()),
        Arc::new(PollingMonitor::new(engine.clone(), poll)),
        EventBus::new(),
    );
    let router = build_router(AppState::new(coordinator.clone(), metrics.clone()));

    TestApp {
        router,
        coordinator,
        engine,
        metrics,
    }
}

pub fn start_body(name: &str) -> Value {
    serde_json::json!({
        "name": name,
        "targetUrl": "http://target.local",
        "users": 10,
        "spawnRate": 2,
        "duration": 60,
        "scenarios": [
            { "name": "home", "method": "get", "endpoint": "/", "weight": "3" }
        ]
    })
}

pub async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, json)
}
