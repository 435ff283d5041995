//! Lifecycle Metrics
//!
//! Counters and duration histograms for finished (or terminally failed)
//! entities, plus the value types returned by gauge queries.

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};

use crate::lifecycle::EntityKind;

/// Metric sink consumed by the reconcilers.
pub trait MetricsSink: Send + Sync {
    fn add_count(&self, kind: EntityKind, value: u64, attributes: &[KeyValue]);
    fn record_duration(&self, kind: EntityKind, seconds: f64, attributes: &[KeyValue]);
}

pub struct KeptnMeters {
    app_count: Counter<u64>,
    app_duration: Histogram<f64>,
    deployment_count: Counter<u64>,
    deployment_duration: Histogram<f64>,
}

impl KeptnMeters {
    pub fn new(meter: &Meter) -> Self {
        Self {
            app_count: meter
                .u64_counter("keptn_app_count")
                .with_description("number of apps")
                .init(),
            app_duration: meter
                .f64_histogram("keptn_app_duration")
                .with_description("duration of app rollouts in seconds")
                .init(),
            deployment_count: meter
                .u64_counter("keptn_deployment_count")
                .with_description("number of workload deployments")
                .init(),
            deployment_duration: meter
                .f64_histogram("keptn_deployment_duration")
                .with_description("duration of workload deployments in seconds")
                .init(),
        }
    }

    /// Instruments on the globally installed meter provider.
    pub fn global() -> Self {
        Self::new(&global::meter("keptn/lifecycle"))
    }
}

impl MetricsSink for KeptnMeters {
    fn add_count(&self, kind: EntityKind, value: u64, attributes: &[KeyValue]) {
        match kind {
            EntityKind::AppVersion => self.app_count.add(value, attributes),
            EntityKind::WorkloadInstance => self.deployment_count.add(value, attributes),
        }
    }

    fn record_duration(&self, kind: EntityKind, seconds: f64, attributes: &[KeyValue]) {
        match kind {
            EntityKind::AppVersion => self.app_duration.record(seconds, attributes),
            EntityKind::WorkloadInstance => self.deployment_duration.record(seconds, attributes),
        }
    }
}

/// One integer gauge observation.
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeValue {
    pub value: i64,
    pub attributes: Vec<KeyValue>,
}

/// One float gauge observation.
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeFloatValue {
    pub value: f64,
    pub attributes: Vec<KeyValue>,
}
