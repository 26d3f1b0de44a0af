mod common;

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use swarmboard_core::{DashboardEvent, ScenarioStepInput, StatsEntry, StatsSnapshot};
use swarmboard_service::testing::run_config;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn serve(router: axum::Router) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn next_json(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

fn steps() -> Vec<ScenarioStepInput> {
    vec![ScenarioStepInput::default()]
}

#[tokio::test]
async fn observer_is_greeted_then_receives_run_events() {
    let app = common::app();
    let addr = serve(app.router.clone()).await;

    let (mut client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    assert_eq!(
        next_json(&mut client).await,
        json!({ "type": "connection", "status": "connected" })
    );

    app.engine.set_snapshot(StatsSnapshot::new(
        "stopped",
        vec![StatsEntry::new("Aggregated", 12, 0, 80.0, 3.0)],
    ));
    app.coordinator
        .start_run(run_config("ws"), steps())
        .await
        .unwrap();
    app.coordinator.stop_run().await.unwrap();

    assert_eq!(
        next_json(&mut client).await,
        json!({ "type": "run-started", "testId": 1, "name": "ws" })
    );
    assert_eq!(
        next_json(&mut client).await,
        json!({ "type": "run-stopped", "testId": 1 })
    );
}

#[tokio::test]
async fn root_path_accepts_observers_and_ignores_client_frames() {
    let app = common::app();
    let addr = serve(app.router.clone()).await;

    let (mut client, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
    assert_eq!(next_json(&mut client).await["type"], "connection");

    client
        .send(Message::Text("{\"type\":\"hello\"}".to_string()))
        .await
        .unwrap();

    app.coordinator.bus().broadcast(&DashboardEvent::EngineUnreachable {
        message: "connection refused".to_string(),
    });
    let event = next_json(&mut client).await;
    assert_eq!(event["type"], "engine-unreachable");
    assert_eq!(event["message"], "connection refused");
}

#[tokio::test]
async fn closed_observer_is_unregistered() {
    let app = common::app();
    let addr = serve(app.router.clone()).await;

    let (mut client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    next_json(&mut client).await;
    assert_eq!(app.coordinator.bus().observer_count(), 1);

    client.close(None).await.unwrap();
    drop(client);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while app.coordinator.bus().observer_count() > 0 {
        assert!(tokio::time::Instant::now() < deadline, "observer never unregistered");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
