use opentelemetry::KeyValue;
use opentelemetry_sdk::{trace as sdktrace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogFormat;

const DEFAULT_FILTER: &str = "chatbridge=debug,tower_http=debug";

/// Install the global subscriber: `RUST_LOG` filter, a text or JSON fmt
/// layer, and an OTLP span exporter when OTEL_EXPORTER_OTLP_ENDPOINT is set.
pub fn init(format: LogFormat) -> anyhow::Result<()> {
    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "chatbridge"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    let (text_layer, json_layer) = match format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.into()),
        ))
        .with(text_layer)
        .with(json_layer)
        .with(telemetry_layer)
        .try_init()?;

    Ok(())
}

/// Flush pending spans. No-op when OTLP export is off.
pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}
