//! Span Binder
//!
//! Keeps one open span per (trace, entity, phase) across repeated reconciles,
//! so a phase that takes many passes is still a single span. Shared by every
//! concurrent reconcile in the process; all map access goes through one mutex
//! and no lock is held across an await.

use opentelemetry::global::BoxedTracer;
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{global, Context, KeyValue};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::lifecycle::{KeptnPhase, LifecycleEntity};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpanKey {
    pub trace_id: String,
    pub app_name: String,
    pub workload_name: Option<String>,
    pub version: String,
    pub phase: &'static str,
}

impl SpanKey {
    pub fn for_entity<E: LifecycleEntity>(entity: &E, phase: &KeptnPhase) -> Self {
        Self {
            trace_id: entity.trace_id().get("traceparent").cloned().unwrap_or_default(),
            app_name: entity.app_name().to_string(),
            workload_name: entity.workload_name().map(str::to_string),
            version: entity.version().to_string(),
            phase: phase.short_name,
        }
    }
}

impl std::fmt::Display for SpanKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.", self.trace_id, self.app_name)?;
        if let Some(workload) = &self.workload_name {
            write!(f, "{}.", workload)?;
        }
        write!(f, "{}.{}", self.version, self.phase)
    }
}

/// A phase span handed out by the binder.
#[derive(Clone)]
pub struct PhaseSpan {
    pub key: SpanKey,
    /// Context carrying the span; children of the phase start from here.
    pub cx: Context,
    /// True if this call started the span rather than reusing a bound one.
    pub created: bool,
}

impl PhaseSpan {
    pub fn add_event(&self, name: impl Into<String>) {
        self.cx.span().add_event(name.into(), Vec::new());
    }

    pub fn set_attributes(&self, attributes: Vec<KeyValue>) {
        self.cx.span().set_attributes(attributes);
    }
}

pub struct SpanBinder<T: Tracer = BoxedTracer> {
    tracer: T,
    spans: Mutex<HashMap<SpanKey, Context>>,
}

impl SpanBinder<BoxedTracer> {
    /// Binder over the globally installed tracer provider.
    pub fn global(name: &'static str) -> Self {
        Self::new(global::tracer(name))
    }
}

impl<T> SpanBinder<T>
where
    T: Tracer + Send + Sync,
    T::Span: Send + Sync + 'static,
{
    pub fn new(tracer: T) -> Self {
        Self {
            tracer,
            spans: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SpanKey, Context>> {
        // A panic elsewhere cannot leave the map half-written; keep serving.
        self.spans.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the span bound to `key`, or starts a consumer span under `parent` and binds it.
    pub fn get_or_create(&self, parent: &Context, key: SpanKey, display_name: String) -> PhaseSpan {
        let mut spans = self.lock();
        if let Some(cx) = spans.get(&key) {
            return PhaseSpan {
                key,
                cx: cx.clone(),
                created: false,
            };
        }

        tracing::debug!(span = %key, "starting phase span");
        let span = self
            .tracer
            .span_builder(display_name)
            .with_kind(SpanKind::Consumer)
            .start_with_context(&self.tracer, parent);
        let cx = parent.with_span(span);
        spans.insert(key.clone(), cx.clone());
        PhaseSpan { key, cx, created: true }
    }

    /// Unbinds `key` without ending its span. The caller owns the returned span.
    pub fn release(&self, key: &SpanKey) -> Option<Context> {
        self.lock().remove(key)
    }

    /// Unbinds `key`, then sets the final status and ends the span.
    ///
    /// Only the caller that wins the release ends the span, so it is ended at
    /// most once. Returns false if nothing was bound.
    pub fn finish(&self, key: &SpanKey, status: Status) -> bool {
        match self.release(key) {
            Some(cx) => {
                let span = cx.span();
                span.set_status(status);
                span.end();
                true
            }
            None => false,
        }
    }

    pub fn is_bound(&self, key: &SpanKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::phase::{WORKLOAD_DEPLOYMENT, WORKLOAD_PRE_DEPLOYMENT};
    use crate::lifecycle::WorkloadInstance;
    use opentelemetry::trace::TracerProvider;
    use opentelemetry_sdk::trace as sdktrace;
    use std::sync::Arc;

    fn sdk_binder() -> (sdktrace::TracerProvider, SpanBinder<sdktrace::Tracer>) {
        let provider = sdktrace::TracerProvider::builder().build();
        let tracer = provider.tracer("span-binder-test");
        (provider, SpanBinder::new(tracer))
    }

    #[test]
    fn test_get_or_create_reuses_bound_span() {
        let (_provider, binder) = sdk_binder();
        let wi = WorkloadInstance::new("demo", "app", "workload1", "1.0.0");
        let key = SpanKey::for_entity(&wi, &WORKLOAD_PRE_DEPLOYMENT);

        let first = binder.get_or_create(&Context::new(), key.clone(), "app-workload1/WorkloadPreDeployTasks".into());
        let second = binder.get_or_create(&Context::new(), key.clone(), "ignored".into());

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(
            first.cx.span().span_context().span_id(),
            second.cx.span().span_context().span_id()
        );
        assert_eq!(binder.len(), 1);
    }

    #[test]
    fn test_child_continues_parent_trace() {
        let (provider, binder) = sdk_binder();
        let parent_span = provider.tracer("parent").start("app");
        let parent = Context::new().with_span(parent_span);

        let wi = WorkloadInstance::new("demo", "app", "workload1", "1.0.0");
        let phase = binder.get_or_create(&parent, SpanKey::for_entity(&wi, &WORKLOAD_DEPLOYMENT), "deploy".into());
        assert_eq!(
            phase.cx.span().span_context().trace_id(),
            parent.span().span_context().trace_id()
        );
    }

    #[test]
    fn test_finish_ends_once() {
        let (_provider, binder) = sdk_binder();
        let wi = WorkloadInstance::new("demo", "app", "workload1", "1.0.0");
        let key = SpanKey::for_entity(&wi, &WORKLOAD_DEPLOYMENT);
        binder.get_or_create(&Context::new(), key.clone(), "deploy".into());

        assert!(binder.finish(&key, Status::Ok));
        assert!(!binder.finish(&key, Status::Ok));
        assert!(binder.release(&key).is_none());
        assert!(binder.is_empty());
    }

    #[test]
    fn test_keys_differ_per_phase_and_version() {
        let a = WorkloadInstance::new("demo", "app", "workload1", "1.0.0");
        let b = WorkloadInstance::new("demo", "app", "workload1", "1.0.1");
        assert_ne!(SpanKey::for_entity(&a, &WORKLOAD_DEPLOYMENT), SpanKey::for_entity(&b, &WORKLOAD_DEPLOYMENT));
        assert_ne!(
            SpanKey::for_entity(&a, &WORKLOAD_DEPLOYMENT),
            SpanKey::for_entity(&a, &WORKLOAD_PRE_DEPLOYMENT)
        );
        assert_eq!(SpanKey::for_entity(&a, &WORKLOAD_DEPLOYMENT).to_string(), ".app.app-workload1.1.0.0.WorkloadDeploy");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_create_binds_once_per_key() {
        let (_provider, binder) = sdk_binder();
        let binder = Arc::new(binder);
        let wi = WorkloadInstance::new("demo", "app", "workload1", "1.0.0");
        let key = SpanKey::for_entity(&wi, &WORKLOAD_DEPLOYMENT);

        let mut handles = Vec::new();
        for _ in 0..32 {
            let binder = binder.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                binder.get_or_create(&Context::new(), key, "deploy".into()).created
            }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(binder.len(), 1);
    }
}
