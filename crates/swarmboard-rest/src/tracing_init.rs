//! Logging and OpenTelemetry tracing initialization
//!
//! Console logging always goes through a `tracing-subscriber` fmt layer configured from
//! `[logging]`. Setting `SWARMBOARD_TRACING_ENABLED=true` adds an OTLP span exporter.
//!
//! # Example
//! ```no_run
//! use swarmboard_rest::tracing_init;
//! use swarmboard_service::LoggingConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let otlp = tracing_init::init(&LoggingConfig::default(), tracing_init::otlp_endpoint_from_env());
//!
//!     // Your application code...
//!
//!     if otlp {
//!         tracing_init::shutdown();
//!     }
//! }
//! ```

use opentelemetry::trace::TraceError;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{self, Sampler};
use opentelemetry_sdk::Resource;
use swarmboard_service::LoggingConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const SERVICE_NAME: &str = "swarmboard";
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

/// Filter from `RUST_LOG` if set, otherwise from the configured level.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn fmt_layer<S>(format: &str) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true);
    if format == "json" {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

/// OTLP collector endpoint when `SWARMBOARD_TRACING_ENABLED` is `true` or `1`.
///
/// The endpoint comes from `OTEL_EXPORTER_OTLP_ENDPOINT` (default: http://localhost:4317).
pub fn otlp_endpoint_from_env() -> Option<String> {
    let enabled = std::env::var("SWARMBOARD_TRACING_ENABLED")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false);
    if !enabled {
        return None;
    }
    Some(
        std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_OTLP_ENDPOINT.to_string()),
    )
}

/// Initialize console logging and, given an endpoint, OTLP span export.
///
/// Falls back to console logging alone if the exporter cannot be built. Returns whether
/// the exporter is installed.
pub fn init(logging: &LoggingConfig, otlp_endpoint: Option<String>) -> bool {
    if let Some(endpoint) = otlp_endpoint {
        match init_tracing(logging, &endpoint) {
            Ok(()) => {
                tracing::info!(%endpoint, "OpenTelemetry tracing initialized");
                return true;
            }
            Err(e) => {
                init_logging(logging);
                tracing::warn!(
                    "Failed to initialize tracing: {}. Falling back to basic logging.",
                    e
                );
                return false;
            }
        }
    }

    init_logging(logging);
    false
}

/// Console logging only.
pub fn init_logging(logging: &LoggingConfig) {
    Registry::default()
        .with(env_filter(&logging.level))
        .with(fmt_layer(&logging.format))
        .init();
}

/// Console logging plus an OTLP exporter sending spans to `endpoint`.
pub fn init_tracing(logging: &LoggingConfig, endpoint: &str) -> Result<(), TraceError> {
    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(
            trace::config()
                .with_sampler(Sampler::AlwaysOn)
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", SERVICE_NAME),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);

    Registry::default()
        .with(env_filter(&logging.level))
        .with(fmt_layer(&logging.format))
        .with(telemetry)
        .init();

    Ok(())
}

/// Shutdown the global tracer provider
///
/// Should be called before application exit to flush any pending spans.
pub fn shutdown() {
    global::shutdown_tracer_provider();
}
