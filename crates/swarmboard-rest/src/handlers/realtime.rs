//! WebSocket event stream.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::sink::{Sink, SinkExt};
use futures::stream::StreamExt;
use swarmboard_core::DashboardEvent;
use swarmboard_service::EventStream;
use tracing::{debug, error};

use crate::state::AppState;

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| websocket_connection(socket, state))
}

async fn websocket_connection(socket: WebSocket, state: AppState) {
    // Subscribe before greeting so no broadcast falls between the two.
    let mut events = state.bus().subscribe();
    let observer_id = events.id();
    debug!(observer_id, "observer connected");

    let (mut sender, mut receiver) = socket.split();

    let greeting = match serde_json::to_string(&DashboardEvent::connected()) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize greeting: {}", e);
            return;
        }
    };
    if sender.send(Message::Text(greeting)).await.is_err() {
        return;
    }

    let mut send_task = tokio::spawn(async move {
        let _ = pump_events(&mut sender, &mut events).await;
    });

    // Client frames carry nothing; read them only to notice the close.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };
    debug!(observer_id, "observer disconnected");
}

async fn pump_events<S>(sender: &mut S, events: &mut EventStream) -> Result<(), S::Error>
where
    S: Sink<Message> + Unpin,
{
    while let Some(payload) = events.recv().await {
        sender.send(Message::Text(payload.to_string())).await?;
    }
    Ok(())
}
