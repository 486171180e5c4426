//! OpenTelemetry initialization and utilities
//!
//! Sets up distributed tracing with OTLP export. Span attributes that can
//! carry database credentials or addresses are redacted before export.

use opentelemetry::trace::TraceResult;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::resource::Resource;
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace::{Config, Sampler, SpanProcessor};
use std::env;
use tracing_subscriber::{registry::LookupSpan, Layer};

use crate::error::{Error, Result};

const SERVICE_NAME: &str = "pipelines-operator";
const REDACTED: &str = "[REDACTED]";

/// Attribute keys that never leave the process unredacted
const SENSITIVE_KEYS: &[&str] = &[
    "db.password",
    "db.user",
    "db.connection_string",
    "net.peer.ip",
    "net.peer.name",
    "server.address",
];

/// A span processor that scrubs sensitive information from span attributes
#[derive(Debug)]
struct ScrubbingProcessor {
    inner: std::sync::Mutex<Box<dyn SpanProcessor + Send + Sync>>,
}

impl ScrubbingProcessor {
    fn new(inner: Box<dyn SpanProcessor + Send + Sync>) -> Self {
        ScrubbingProcessor {
            inner: std::sync::Mutex::new(inner),
        }
    }

    fn scrub_attributes(&self, attributes: &mut [KeyValue]) {
        for kv in attributes.iter_mut() {
            let key = kv.key.as_str();
            if SENSITIVE_KEYS.contains(&key) || key.ends_with(".password") {
                kv.value = opentelemetry::Value::String(REDACTED.into());
            }
        }
    }
}

impl SpanProcessor for ScrubbingProcessor {
    fn on_start(&self, span: &mut opentelemetry_sdk::trace::Span, cx: &opentelemetry::Context) {
        if let Ok(inner) = self.inner.lock() {
            inner.on_start(span, cx);
        }
    }

    fn on_end(&self, mut span: SpanData) {
        self.scrub_attributes(&mut span.attributes);
        if let Ok(inner) = self.inner.lock() {
            inner.on_end(span);
        }
    }

    fn force_flush(&self) -> TraceResult<()> {
        match self.inner.lock() {
            Ok(inner) => inner.force_flush(),
            Err(_) => Ok(()),
        }
    }

    fn shutdown(&mut self) -> TraceResult<()> {
        match self.inner.lock() {
            Ok(mut inner) => inner.shutdown(),
            Err(_) => Ok(()),
        }
    }
}

/// Initialize OpenTelemetry tracer and return the tracing layer for it
pub fn init_telemetry<S>(_subscriber: &S) -> Result<Box<dyn Layer<S> + Send + Sync>>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a> + Send + Sync,
{
    global::set_text_map_propagator(TraceContextPropagator::new());

    let otlp_endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4317".to_string());

    let resource = Resource::new(vec![
        KeyValue::new("service.name", SERVICE_NAME),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]);

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(&otlp_endpoint)
        .build_span_exporter()
        .map_err(|e| Error::ConfigError(format!("failed to build OTLP exporter: {}", e)))?;

    let batch_processor =
        opentelemetry_sdk::trace::BatchSpanProcessor::builder(exporter, runtime::Tokio).build();

    let scrubbing_processor = ScrubbingProcessor::new(Box::new(batch_processor));

    let provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_config(
            Config::default()
                .with_resource(resource)
                .with_sampler(Sampler::AlwaysOn),
        )
        .with_span_processor(scrubbing_processor)
        .build();

    let tracer = opentelemetry::trace::TracerProvider::tracer(&provider, SERVICE_NAME);

    global::set_tracer_provider(provider);

    Ok(tracing_opentelemetry::layer().with_tracer(tracer).boxed())
}

/// Shutdown OpenTelemetry tracer
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}
