//! Phase Driver
//!
//! Runs one lifecycle phase per reconcile for any entity kind: status
//! bookkeeping, phase spans, events, metrics and the retry directive. The
//! entity-specific work of a phase is delegated to a `PhaseHandler`.

use async_trait::async_trait;
use opentelemetry::global::BoxedTracer;
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{global, Context};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ReconcileError, Requeue, RequeuePolicy};
use crate::lifecycle::phase::COMPLETED;
use crate::lifecycle::{KeptnPhase, KeptnState, LifecycleEntity};
use crate::store::{Store, StoreError};
use crate::telemetry::{extract_context, semconv, EventRecorder, EventType, LifecycleEvent, MetricsSink, SpanBinder, SpanKey};

/// The work behind one phase of one entity kind.
#[async_trait]
pub trait PhaseHandler<E: LifecycleEntity>: Send + Sync {
    /// Returns the phase's current verdict. May write entity-specific status
    /// fields (such as per-workload states) along the way.
    async fn reconcile_phase(&self, entity: &mut E, phase: &KeptnPhase) -> anyhow::Result<KeptnState>;
}

/// Trace contexts and cancellation for a single reconcile call.
///
/// Dropping it ends the reconcile span.
pub struct ReconcileContext<'a> {
    /// Carries the reconcile span, continued from the entity's annotations.
    pub cx: Context,
    /// Application-level trace that phase spans are parented to.
    pub app_cx: Context,
    pub cancel: &'a CancellationToken,
}

impl ReconcileContext<'_> {
    pub fn fail(&self, message: impl Into<String>) {
        self.cx.span().set_status(Status::error(message.into()));
    }
}

impl Drop for ReconcileContext<'_> {
    fn drop(&mut self) {
        self.cx.span().end();
    }
}

pub struct PhaseDriver {
    tracer: BoxedTracer,
    binder: Arc<SpanBinder>,
    recorder: Arc<dyn EventRecorder>,
    meters: Arc<dyn MetricsSink>,
    policy: RequeuePolicy,
}

impl PhaseDriver {
    pub fn new(
        binder: Arc<SpanBinder>,
        recorder: Arc<dyn EventRecorder>,
        meters: Arc<dyn MetricsSink>,
        policy: RequeuePolicy,
    ) -> Self {
        Self {
            tracer: global::tracer("keptn/lifecycle"),
            binder,
            recorder,
            meters,
            policy,
        }
    }

    pub fn policy(&self) -> &RequeuePolicy {
        &self.policy
    }

    pub fn binder(&self) -> &Arc<SpanBinder> {
        &self.binder
    }

    /// Opens the reconcile span for `entity`, continuing its caller trace.
    pub fn start_reconcile<'a, E: LifecycleEntity>(
        &self,
        name: &'static str,
        entity: &E,
        cancel: &'a CancellationToken,
    ) -> ReconcileContext<'a> {
        let parent = extract_context(&entity.meta().annotations);
        let span = self
            .tracer
            .span_builder(name)
            .with_kind(SpanKind::Consumer)
            .with_attributes(semconv::identity_attributes(entity))
            .start_with_context(&self.tracer, &parent);
        ReconcileContext {
            cx: parent.with_span(span),
            app_cx: extract_context(entity.trace_id()),
            cancel,
        }
    }

    pub fn record<E: LifecycleEntity>(
        &self,
        phase: &KeptnPhase,
        event_type: EventType,
        entity: &E,
        short_reason: &str,
        long_reason: &str,
    ) {
        self.recorder
            .record(LifecycleEvent::for_phase(phase, event_type, entity, short_reason, long_reason));
    }

    /// First reconcile of an entity: stamps the start time and opens the span
    /// of the first phase.
    ///
    /// Until the first attempt is written back this runs again on every pass.
    /// The start time is then re-stamped, but the "Started" event is only
    /// recorded by the pass that opened the span.
    pub fn begin<E: LifecycleEntity>(&self, rctx: &ReconcileContext<'_>, entity: &mut E) {
        let Some(first) = E::phases().first() else {
            return;
        };
        entity.lifecycle_mut().set_start_time();

        let span = self.binder.get_or_create(
            &rctx.app_cx,
            SpanKey::for_entity(entity, first),
            span_name(entity, first),
        );
        if !span.created {
            debug!(key = %entity.key(), "first phase already started");
            return;
        }
        span.set_attributes(semconv::identity_attributes(entity));
        span.add_event(format!("{} started", first.long_name));
        self.record(first, EventType::Normal, entity, "Started", "have started");
    }

    /// Runs the first phase that has not succeeded yet, or completes the entity.
    pub async fn advance<E: LifecycleEntity>(
        &self,
        rctx: &ReconcileContext<'_>,
        entity: &mut E,
        store: &dyn Store<E>,
        handler: &dyn PhaseHandler<E>,
    ) -> Result<Requeue, ReconcileError> {
        for phase in E::phases() {
            if !entity.is_phase_succeeded(phase) {
                return self.handle_phase(rctx, entity, phase, store, handler).await;
            }
        }
        self.complete(rctx, entity, store).await
    }

    /// One attempt at `phase`. Status only moves forward and is persisted only
    /// if something observable changed.
    pub async fn handle_phase<E: LifecycleEntity>(
        &self,
        rctx: &ReconcileContext<'_>,
        entity: &mut E,
        phase: &KeptnPhase,
        store: &dyn Store<E>,
        handler: &dyn PhaseHandler<E>,
    ) -> Result<Requeue, ReconcileError> {
        debug!(phase = phase.short_name, "{} not finished", phase.long_name);
        let before = entity.clone();

        entity.lifecycle_mut().current_phase = phase.short_name.to_string();

        // The span of a failed phase was ended when it failed; do not reopen it.
        if entity.is_phase_failed(phase) {
            self.record(phase, EventType::Warning, entity, "Failed", "has failed");
            return Ok(self.policy.phase_failed());
        }

        let span = self.binder.get_or_create(
            &rctx.app_cx,
            SpanKey::for_entity(entity, phase),
            span_name(entity, phase),
        );

        entity.advance_phase_state(phase.kind, KeptnState::Progressing);

        let outcome = tokio::select! {
            biased;
            _ = rctx.cancel.cancelled() => None,
            result = handler.reconcile_phase(entity, phase) => Some(result),
        };
        let state = match outcome {
            None => {
                info!(phase = phase.short_name, "reconcile cancelled, dropping phase attempt");
                return Ok(Requeue::Immediately);
            }
            Some(Err(source)) => {
                span.add_event(format!("{} could not get reconciled", phase.long_name));
                rctx.fail(source.to_string());
                self.record(phase, EventType::Warning, entity, "ReconcileErrored", "could not get reconciled");
                return Err(ReconcileError::Phase {
                    phase: phase.short_name,
                    source,
                });
            }
            Some(Ok(state)) => state,
        };

        entity.advance_phase_state(phase.kind, state);
        let verdict = entity.phase_state(phase);
        let mut newly_failed = false;
        match verdict {
            KeptnState::Succeeded => {
                span.add_event(format!("{} has succeeded", phase.long_name));
                self.binder.finish(&span.key, Status::Ok);
                self.record(phase, EventType::Normal, entity, "Succeeded", "has succeeded");
            }
            KeptnState::Failed => {
                let lifecycle = entity.lifecycle_mut();
                lifecycle.status = KeptnState::Failed;
                newly_failed = lifecycle.set_end_time();
                span.add_event(format!("{} has failed", phase.long_name));
                self.binder.finish(&span.key, Status::error("Failed"));
            }
            KeptnState::Pending | KeptnState::Progressing => {
                let lifecycle = entity.lifecycle_mut();
                lifecycle.status = lifecycle.status.advance(KeptnState::Progressing);
                span.add_event(format!("{} not finished", phase.long_name));
                self.record(phase, EventType::Warning, entity, "NotFinished", "has not finished");
            }
        }

        // Finished spans are already ended; only annotate a live one.
        if before.lifecycle().current_phase != entity.lifecycle().current_phase && !verdict.is_completed() {
            span.set_attributes(semconv::identity_attributes(entity));
        }

        if *entity != before {
            match self.persist(rctx, entity, store).await {
                Ok(true) => {}
                Ok(false) => return Ok(Requeue::Immediately),
                Err(err) => {
                    // The next pass reloads the stored entity and retries the phase.
                    error!(key = %entity.key(), error = %err, "could not update status");
                    return Ok(self.policy.phase_poll());
                }
            }
        }

        // A failure is only reported once it is stored.
        if verdict == KeptnState::Failed {
            if newly_failed {
                self.meters
                    .add_count(E::KIND, 1, &semconv::metrics_attributes(entity));
            }
            self.record(phase, EventType::Warning, entity, "Failed", "has failed");
        }
        Ok(self.policy.phase_poll())
    }

    async fn complete<E: LifecycleEntity>(
        &self,
        rctx: &ReconcileContext<'_>,
        entity: &mut E,
        store: &dyn Store<E>,
    ) -> Result<Requeue, ReconcileError> {
        if entity.lifecycle().is_end_time_set() && entity.lifecycle().status.is_succeeded() {
            debug!(key = %entity.key(), "already completed");
            return Ok(Requeue::Never);
        }

        let lifecycle = entity.lifecycle_mut();
        lifecycle.current_phase = COMPLETED.short_name.to_string();
        lifecycle.status = KeptnState::Succeeded;
        lifecycle.set_end_time();

        match self.persist(rctx, entity, store).await {
            Ok(true) => {}
            Ok(false) => return Ok(Requeue::Immediately),
            Err(source) => {
                rctx.fail(source.to_string());
                return Err(ReconcileError::Persist {
                    key: entity.key(),
                    source,
                });
            }
        }

        let attrs = semconv::metrics_attributes(entity);
        info!(kind = %E::KIND, key = %entity.key(), "increasing completion count");
        self.meters.add_count(E::KIND, 1, &attrs);
        if let Some(seconds) = entity.lifecycle().duration_secs() {
            self.meters.record_duration(E::KIND, seconds, &attrs);
        }
        let last = E::phases().last().unwrap_or(&COMPLETED);
        self.record(last, EventType::Normal, entity, "Finished", "is finished");
        Ok(Requeue::Never)
    }

    /// Writes the status back. Returns false if the reconcile was cancelled
    /// and nothing was written.
    async fn persist<E: LifecycleEntity>(
        &self,
        rctx: &ReconcileContext<'_>,
        entity: &mut E,
        store: &dyn Store<E>,
    ) -> Result<bool, StoreError> {
        if rctx.cancel.is_cancelled() {
            warn!(key = %entity.key(), "reconcile cancelled, status not written");
            return Ok(false);
        }
        let version = store.update_status(entity).await?;
        entity.meta_mut().resource_version = version;
        Ok(true)
    }
}

fn span_name<E: LifecycleEntity>(entity: &E, phase: &KeptnPhase) -> String {
    format!("{}/{}", entity.display_name(), phase.short_name)
}
