//! OpenTelemetry span export.
//!
//! Bridges the `tracing` spans the client emits (one per request, batch and
//! negotiation step) to an OpenTelemetry stdout exporter.

use crate::logging::LoggingConfig;
use cohort_error::{CohortResult, ConfigError};
use opentelemetry::{KeyValue, global, trace::TracerProvider};
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use opentelemetry_stdout::SpanExporter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a global subscriber exporting spans alongside the log lines of `logging`.
///
/// Returns the tracer provider; dropping it flushes pending spans.
///
/// # Errors
///
/// Fails when the filter directives are invalid or a global subscriber is
/// already installed.
pub fn init_observability(
    service_name: &str,
    logging: &LoggingConfig,
) -> CohortResult<SdkTracerProvider> {
    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .with_attributes(vec![KeyValue::new(
            "service.version",
            env!("CARGO_PKG_VERSION"),
        )])
        .build();

    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(SpanExporter::default())
        .with_resource(resource)
        .build();
    global::set_tracer_provider(provider.clone());

    let tracer = provider.tracer(service_name.to_string());
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(logging.env_filter()?)
        .with(logging.fmt_layer())
        .with(otel_layer)
        .try_init()
        .map_err(|e| ConfigError::new(format!("Failed to install telemetry subscriber: {}", e)))?;

    Ok(provider)
}
