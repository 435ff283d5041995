//! Workload Instance Reconciler
//!
//! Holds a workload instance until its owning application version has passed
//! its pre-deployment evaluations, then drives it through its own phases.

use anyhow::anyhow;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use super::checks::{CheckRequest, CheckRunner, CheckType};
use super::driver::{PhaseDriver, PhaseHandler, ReconcileContext};
use super::resolver::AppVersionResolver;
use super::{ReconcileError, Requeue};
use crate::lifecycle::phase::APP_PRE_EVALUATION;
use crate::lifecycle::{
    ApplicationVersion, EntityKind, KeptnPhase, KeptnState, LifecycleEntity, ObjectKey, WorkloadInstance,
};
use crate::store::Store;
use crate::telemetry::{extract_context, EventType};

/// Phase work for workload instances: every phase is a check.
struct WorkloadPhases {
    checks: Arc<dyn CheckRunner>,
}

#[async_trait]
impl PhaseHandler<WorkloadInstance> for WorkloadPhases {
    async fn reconcile_phase(&self, instance: &mut WorkloadInstance, phase: &KeptnPhase) -> anyhow::Result<KeptnState> {
        let check_type = CheckType::for_phase(phase.kind).ok_or_else(|| anyhow!("{} has no checks", phase))?;
        self.checks
            .run(&CheckRequest::for_entity(instance, phase.kind, check_type))
            .await
    }
}

pub struct WorkloadInstanceReconciler {
    instances: Arc<dyn Store<WorkloadInstance>>,
    resolver: AppVersionResolver,
    phases: WorkloadPhases,
    driver: Arc<PhaseDriver>,
}

impl WorkloadInstanceReconciler {
    pub fn new(
        instances: Arc<dyn Store<WorkloadInstance>>,
        apps: Arc<dyn Store<ApplicationVersion>>,
        checks: Arc<dyn CheckRunner>,
        driver: Arc<PhaseDriver>,
    ) -> Self {
        Self {
            instances,
            resolver: AppVersionResolver::new(apps),
            phases: WorkloadPhases { checks },
            driver,
        }
    }

    /// Advances the workload instance at `key` by at most one phase, once the
    /// owning application allows it.
    #[instrument(skip(self, cancel), fields(kind = "KeptnWorkloadInstance"))]
    pub async fn reconcile(&self, key: &ObjectKey, cancel: &CancellationToken) -> Result<Requeue, ReconcileError> {
        debug!("searching for workload instance");
        let mut instance = match self.instances.get(key).await {
            Ok(instance) => instance,
            Err(err) if err.is_not_found() => {
                debug!("workload instance not found, nothing to do");
                return Ok(Requeue::Never);
            }
            Err(source) => {
                error!(error = %source, "could not fetch workload instance");
                return Err(ReconcileError::Load {
                    kind: EntityKind::WorkloadInstance,
                    key: key.clone(),
                    source,
                });
            }
        };

        let mut rctx = self
            .driver
            .start_reconcile("reconcile_workload_instance", &instance, cancel);

        let app = match self.gate(&rctx, &instance).await? {
            Ok(app) => app,
            Err(requeue) => return Ok(requeue),
        };

        let mut changed = false;
        if instance.status.pre_deployment_status.is_pending() {
            instance.status.pre_deployment_status = KeptnState::Progressing;
            changed = true;
        }
        if instance.spec.trace_id.is_empty() && !app.spec.trace_id.is_empty() {
            instance.spec.trace_id = app.spec.trace_id.clone();
            changed = true;
        }
        if changed && !self.save(&rctx, &mut instance).await? {
            return Ok(Requeue::Immediately);
        }
        rctx.app_cx = extract_context(instance.trace_id());

        if instance.status.lifecycle.current_phase.is_empty() {
            self.driver.begin(&rctx, &mut instance);
        }
        self.driver
            .advance(&rctx, &mut instance, self.instances.as_ref(), &self.phases)
            .await
    }

    /// Resolves the owning application version and checks that its
    /// pre-deployment evaluation succeeded. The inner `Err` is the retry
    /// directive for an application that is not ready.
    async fn gate(
        &self,
        rctx: &ReconcileContext<'_>,
        instance: &WorkloadInstance,
    ) -> Result<Result<ApplicationVersion, Requeue>, ReconcileError> {
        let phase = &APP_PRE_EVALUATION;
        let policy = self.driver.policy();

        let app = match self.resolver.resolve(instance).await {
            Ok(Some(app)) => app,
            Ok(None) => {
                rctx.fail("app could not be found");
                self.driver.record(
                    phase,
                    EventType::Warning,
                    instance,
                    "AppVersionNotFound",
                    "has failed since app could not be found",
                );
                return Err(ReconcileError::AppVersionNotFound { key: instance.key() });
            }
            Err(source) => {
                rctx.fail("app could not be retrieved");
                self.driver.record(
                    phase,
                    EventType::Warning,
                    instance,
                    "GetAppVersionFailed",
                    "has failed since app could not be retrieved",
                );
                return Err(ReconcileError::AppVersionLookup {
                    key: instance.key(),
                    source,
                });
            }
        };

        if app.is_pre_deployment_evaluation_succeeded() {
            return Ok(Ok(app));
        }
        if app.is_pre_deployment_evaluation_failed() {
            self.driver
                .record(phase, EventType::Warning, instance, "Failed", "has failed since app has failed");
            return Ok(Err(policy.phase_failed()));
        }
        self.driver.record(
            phase,
            EventType::Normal,
            instance,
            "NotFinished",
            "Pre evaluations tasks for app not finished",
        );
        Ok(Err(policy.dependency_pending()))
    }

    /// Writes the whole instance, spec included. Returns false if the reconcile
    /// was cancelled and nothing was written.
    async fn save(&self, rctx: &ReconcileContext<'_>, instance: &mut WorkloadInstance) -> Result<bool, ReconcileError> {
        if rctx.cancel.is_cancelled() {
            info!("reconcile cancelled before gate state was written");
            return Ok(false);
        }
        match self.instances.update(instance).await {
            Ok(version) => {
                instance.metadata.resource_version = version;
                Ok(true)
            }
            Err(source) => {
                rctx.fail(source.to_string());
                Err(ReconcileError::Persist {
                    key: instance.key(),
                    source,
                })
            }
        }
    }
}
