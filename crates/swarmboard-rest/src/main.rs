use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use swarmboard_metadata::{create_sqlite_pool, run_migrations, SqliteRunRepository};
use swarmboard_rest::{build_router, tracing_init, AppState};
use swarmboard_service::{
    build_http_client, Config, EventBus, LocustClient, PollingMonitor, PrometheusClient,
    RunCoordinator, ScenarioFile,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    });

    // Validate configuration
    config.validate()?;

    let otlp = tracing_init::init(&config.logging, tracing_init::otlp_endpoint_from_env());

    // Initialize SQLite database
    tracing::info!("Connecting to database: {}", config.database.path);
    let pool = create_sqlite_pool(
        &config.database.path,
        config.database.max_connections,
        Duration::from_secs(config.database.connection_timeout_seconds),
    )
    .await
    .context("failed to open run store")?;

    tracing::info!("Running database migrations...");
    run_migrations(&pool).await.context("failed to migrate run store")?;

    // External services share one connection pool
    let http = build_http_client(
        config.engine.connect_timeout(),
        config.engine.request_timeout(),
    )?;
    let engine = Arc::new(LocustClient::new(http.clone(), &config.engine.url));
    let metrics_backend = Arc::new(PrometheusClient::new(http, &config.engine.prometheus_url));

    let coordinator = RunCoordinator::new(
        Arc::new(SqliteRunRepository::new(pool.clone())),
        engine.clone(),
        Arc::new(ScenarioFile::new(&config.engine.scenarios_path)),
        Arc::new(PollingMonitor::new(engine, config.engine.poll_interval())),
        EventBus::new(),
    );

    if let Some(run_id) = coordinator.recover().await? {
        tracing::info!(%run_id, "Resumed unfinished run");
    }

    let app = build_router(AppState::new(Arc::clone(&coordinator), metrics_backend));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        engine = %config.engine.url,
        poll_interval_ms = config.engine.poll_interval_ms,
        "SwarmBoard listening on {}",
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&coordinator)))
        .await?;

    pool.close().await;
    tracing::info!("Server shutdown complete");

    if otlp {
        tracing_init::shutdown();
    }

    Ok(())
}

/// Wait for SIGTERM or SIGINT signal for graceful shutdown.
///
/// On a signal the poll loop is cancelled. A run still in progress stays `running` in the
/// store and is resumed on the next start.
async fn shutdown_signal(coordinator: Arc<RunCoordinator>) {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }

    coordinator.shutdown();
}
