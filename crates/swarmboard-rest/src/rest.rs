use axum::{
    extract::Request,
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{classify::ServerErrorsFailureClass, cors::CorsLayer, trace::TraceLayer};
use tracing::{info_span, Span};
use uuid::Uuid;

use crate::handlers;
use crate::state::AppState;

/// Builds the router serving the REST API, the event stream and the probes.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/tests/start", post(handlers::start_run))
        .route("/tests/stop", post(handlers::stop_run))
        .route("/tests/current", get(handlers::current_run))
        .route("/tests/history", get(handlers::history))
        .route("/tests/:id", get(handlers::get_run))
        .route("/metrics/query", get(handlers::metrics_query))
        .route("/engine/stats", get(handlers::engine_stats))
        .route("/locust/stats", get(handlers::engine_stats));

    Router::new()
        .nest("/api", api)
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics))
        .route("/ws", get(handlers::websocket_handler))
        .route("/", get(handlers::websocket_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request| {
                    let request_id = Uuid::new_v4();
                    info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_request(|_request: &Request, _span: &Span| {
                    tracing::debug!("started processing request");
                })
                .on_response(|response: &Response, latency: std::time::Duration, _span: &Span| {
                    let status = response.status();
                    let latency_ms = latency.as_millis();

                    if status.is_server_error() {
                        tracing::error!(status = %status, latency_ms = latency_ms, "request failed with server error");
                    } else if status.is_client_error() {
                        tracing::warn!(status = %status, latency_ms = latency_ms, "request failed with client error");
                    } else {
                        tracing::info!(status = %status, latency_ms = latency_ms, "request completed");
                    }
                })
                .on_failure(|failure_class: ServerErrorsFailureClass, latency: std::time::Duration, _span: &Span| {
                    tracing::error!(failure_class = ?failure_class, latency_ms = latency.as_millis(), "request failed");
                }),
        )
}
