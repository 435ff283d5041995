//! Observability bootstrap (OpenTelemetry + tracing)
//!
//! Installs the W3C propagator, the log subscriber and, when enabled, an OTLP
//! span exporter. Also carries the carrier helpers used to continue traces
//! stored on entities.

use opentelemetry::trace::TracerProvider; // Import trait for .tracer()
use opentelemetry::{global, Context, KeyValue};
use opentelemetry_sdk::{propagation::TraceContextPropagator, runtime, trace as sdktrace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::lifecycle::TraceCarrier;

pub struct OtelGuard {
    exporting: bool,
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if self.exporting {
            global::shutdown_tracer_provider();
        }
    }
}

pub fn init_telemetry(service_name: &str, otlp_enabled: bool, log_filter: &str) -> anyhow::Result<OtelGuard> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let telemetry = if otlp_enabled {
        let exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .build_span_exporter()?;

        let trace_config = sdktrace::Config::default().with_resource(Resource::new(vec![
            KeyValue::new("service.name", service_name.to_string()),
        ]));

        let provider = sdktrace::TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_config(trace_config)
            .build();

        global::set_tracer_provider(provider.clone());

        // The layer needs the SDK tracer, not the boxed global one.
        let tracer = provider.tracer(service_name.to_string());
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_filter));

    Registry::default()
        .with(filter)
        .with(telemetry)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()?;

    Ok(OtelGuard { exporting: otlp_enabled })
}

/// Extracts a trace context from a flat string carrier, starting from an empty context.
pub fn extract_context(carrier: &TraceCarrier) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract_with_context(&Context::new(), carrier))
}
