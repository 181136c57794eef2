//! Tracing setup: console logging through `tracing-subscriber`, plus optional OpenTelemetry export.
//!
//! OTLP export is **disabled by default** and is switched on with `enable_otel_export: true`. The
//! exporter itself is configured through the standard OpenTelemetry environment variables:
//!
//! - `OTEL_EXPORTER_OTLP_ENDPOINT` - The OTLP endpoint URL
//! - `OTEL_EXPORTER_OTLP_PROTOCOL` - `http/protobuf` (default) or `http/json`
//! - `OTEL_EXPORTER_OTLP_HEADERS` - Headers as comma-separated key=value pairs, `%20` for spaces
//! - `OTEL_SERVICE_NAME` - Service name, defaults to `roomctl`
//!
//! Log verbosity follows `RUST_LOG` and defaults to `info`.

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{Protocol, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_SERVICE_NAME: &str = "roomctl";
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4318";

/// Kept so pending spans can be flushed on shutdown; `tracing-opentelemetry` only holds the tracer.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Initialize tracing with optional OpenTelemetry support.
///
/// Falls back to console-only logging when the OTLP exporter cannot be built.
pub fn init_telemetry(enable_otel_export: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if !enable_otel_export {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()?;

        info!("Telemetry initialized (OTLP export disabled)");
        return Ok(());
    }

    match create_otlp_tracer() {
        Ok(tracer) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init()?;

            info!("Telemetry initialized with OTLP export enabled");
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .try_init()?;

            info!("Telemetry initialized without OTLP export: {}", e);
        }
    }

    Ok(())
}

/// Parses `OTEL_EXPORTER_OTLP_HEADERS`-style `key=value,key=value` pairs.
fn parse_otlp_headers(raw: &str) -> HashMap<String, String> {
    raw.replace("%20", " ")
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn create_otlp_tracer() -> anyhow::Result<opentelemetry_sdk::trace::Tracer> {
    let service_name = std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string());
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or_else(|_| DEFAULT_OTLP_ENDPOINT.to_string());

    // The subscriber is not installed yet, so report on stderr
    eprintln!("[OTLP] Service Name: {}", service_name);
    eprintln!("[OTLP] Endpoint: {}", endpoint);

    let headers = std::env::var("OTEL_EXPORTER_OTLP_HEADERS")
        .map(|raw| parse_otlp_headers(&raw))
        .unwrap_or_default();

    let protocol = match std::env::var("OTEL_EXPORTER_OTLP_PROTOCOL").as_deref() {
        Ok("http/json") => Protocol::HttpJson,
        _ => Protocol::HttpBinary,
    };

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(&endpoint)
        .with_protocol(protocol)
        .with_headers(headers)
        .build()?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            opentelemetry_sdk::Resource::builder()
                .with_attribute(KeyValue::new("service.name", service_name.clone()))
                .build(),
        )
        .build();

    let tracer = tracer_provider.tracer(service_name);
    let _ = TRACER_PROVIDER.set(tracer_provider);

    Ok(tracer)
}

/// Flushes pending spans. Call before the process exits.
pub fn shutdown_telemetry() {
    if let Some(provider) = TRACER_PROVIDER.get()
        && let Err(e) = provider.shutdown()
    {
        tracing::error!("Failed to shutdown tracer provider: {}", e);
    }
}
