//! Telemetry Module
//!
//! Spans, events and metrics emitted while entities move through their phases.

pub mod events;
pub mod metrics;
pub mod otel;
pub mod semconv;
pub mod span_binder;

pub use events::{BroadcastRecorder, EventRecorder, EventType, LifecycleEvent, ObjectReference};
pub use metrics::{GaugeFloatValue, GaugeValue, KeptnMeters, MetricsSink};
pub use otel::{extract_context, init_telemetry, OtelGuard};
pub use span_binder::{PhaseSpan, SpanBinder, SpanKey};
