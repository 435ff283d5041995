//! Application Version Reconciler
//!
//! Drives an application version through pre-deployment tasks and
//! evaluations, the roll-up of its workload instances, and post-deployment
//! tasks and evaluations.

use anyhow::{anyhow, Context as _};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

use super::checks::{CheckRequest, CheckRunner, CheckType};
use super::driver::{PhaseDriver, PhaseHandler};
use super::{ReconcileError, Requeue};
use crate::lifecycle::{
    ApplicationVersion, EntityKind, KeptnPhase, KeptnState, ObjectKey, PhaseKind, StatusSummary, WorkloadInstance,
    WorkloadStatus,
};
use crate::store::Store;

/// Phase work for application versions.
struct AppPhases {
    workloads: Arc<dyn Store<WorkloadInstance>>,
    checks: Arc<dyn CheckRunner>,
}

impl AppPhases {
    /// Rolls the states of all declared workload instances into one.
    /// An instance that does not exist yet counts as pending.
    async fn reconcile_workloads(&self, app: &mut ApplicationVersion) -> anyhow::Result<KeptnState> {
        let mut summary = StatusSummary::default();
        let mut statuses = Vec::with_capacity(app.spec.workloads.len());

        for workload in &app.spec.workloads {
            let name = WorkloadInstance::instance_name(&app.workload_name(workload), &workload.version);
            let key = ObjectKey::new(&app.metadata.namespace, name);
            let state = match self.workloads.get(&key).await {
                Ok(instance) => instance.status.lifecycle.status,
                Err(err) if err.is_not_found() => {
                    debug!(workload = %key, "workload instance not created yet");
                    KeptnState::Pending
                }
                Err(err) => return Err(err).with_context(|| format!("could not fetch workload instance {}", key)),
            };
            summary.add(state);
            statuses.push(WorkloadStatus {
                workload: workload.clone(),
                status: state,
            });
        }

        app.status.workload_status = statuses;
        Ok(summary.overall())
    }
}

#[async_trait]
impl PhaseHandler<ApplicationVersion> for AppPhases {
    async fn reconcile_phase(&self, app: &mut ApplicationVersion, phase: &KeptnPhase) -> anyhow::Result<KeptnState> {
        if phase.kind == PhaseKind::Deployment {
            return self.reconcile_workloads(app).await;
        }
        let check_type = CheckType::for_phase(phase.kind).ok_or_else(|| anyhow!("{} has no checks", phase))?;
        self.checks
            .run(&CheckRequest::for_entity(app, phase.kind, check_type))
            .await
    }
}

pub struct AppVersionReconciler {
    apps: Arc<dyn Store<ApplicationVersion>>,
    phases: AppPhases,
    driver: Arc<PhaseDriver>,
}

impl AppVersionReconciler {
    pub fn new(
        apps: Arc<dyn Store<ApplicationVersion>>,
        workloads: Arc<dyn Store<WorkloadInstance>>,
        checks: Arc<dyn CheckRunner>,
        driver: Arc<PhaseDriver>,
    ) -> Self {
        Self {
            apps,
            phases: AppPhases { workloads, checks },
            driver,
        }
    }

    /// Advances the application version at `key` by at most one phase.
    #[instrument(skip(self, cancel), fields(kind = "KeptnAppVersion"))]
    pub async fn reconcile(&self, key: &ObjectKey, cancel: &CancellationToken) -> Result<Requeue, ReconcileError> {
        debug!("searching for app version");
        let mut app = match self.apps.get(key).await {
            Ok(app) => app,
            Err(err) if err.is_not_found() => {
                debug!("app version not found, nothing to do");
                return Ok(Requeue::Never);
            }
            Err(source) => {
                error!(error = %source, "could not fetch app version");
                return Err(ReconcileError::Load {
                    kind: EntityKind::AppVersion,
                    key: key.clone(),
                    source,
                });
            }
        };

        let rctx = self.driver.start_reconcile("reconcile_app_version", &app, cancel);
        if app.status.lifecycle.current_phase.is_empty() {
            self.driver.begin(&rctx, &mut app);
        }
        self.driver
            .advance(&rctx, &mut app, self.apps.as_ref(), &self.phases)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::WorkloadRef;
    use crate::reconciler::checks::DefinitionlessRunner;
    use crate::reconciler::RequeuePolicy;
    use crate::store::MemoryStore;
    use crate::telemetry::{BroadcastRecorder, KeptnMeters, SpanBinder};

    fn phases(store: &MemoryStore) -> AppPhases {
        AppPhases {
            workloads: Arc::new(store.clone()),
            checks: Arc::new(DefinitionlessRunner),
        }
    }

    #[tokio::test]
    async fn test_workload_rollup_counts_missing_as_pending() {
        let store = MemoryStore::default();
        let mut app = ApplicationVersion::new(
            "demo",
            "app",
            "1.0.0",
            vec![WorkloadRef::new("workload1", "1.0.0"), WorkloadRef::new("workload2", "1.0.0")],
        );
        let mut done = WorkloadInstance::new("demo", "app", "workload1", "1.0.0");
        done.status.lifecycle.status = KeptnState::Succeeded;
        store.create(&done).await.unwrap();

        let state = phases(&store).reconcile_workloads(&mut app).await.unwrap();
        assert_eq!(state, KeptnState::Pending);
        assert_eq!(app.status.workload_status.len(), 2);
        assert_eq!(app.status.workload_status[0].status, KeptnState::Succeeded);
        assert_eq!(app.status.workload_status[1].status, KeptnState::Pending);
    }

    #[tokio::test]
    async fn test_workload_rollup_failure_wins() {
        let store = MemoryStore::default();
        let mut app = ApplicationVersion::new(
            "demo",
            "app",
            "1.0.0",
            vec![WorkloadRef::new("workload1", "1.0.0"), WorkloadRef::new("workload2", "1.0.0")],
        );
        let mut failed = WorkloadInstance::new("demo", "app", "workload1", "1.0.0");
        failed.status.lifecycle.status = KeptnState::Failed;
        store.create(&failed).await.unwrap();
        let mut running = WorkloadInstance::new("demo", "app", "workload2", "1.0.0");
        running.status.lifecycle.status = KeptnState::Progressing;
        store.create(&running).await.unwrap();

        let state = phases(&store).reconcile_workloads(&mut app).await.unwrap();
        assert_eq!(state, KeptnState::Failed);
    }

    #[tokio::test]
    async fn test_missing_app_version_is_not_an_error() {
        let store = Arc::new(MemoryStore::default());
        let driver = Arc::new(PhaseDriver::new(
            Arc::new(SpanBinder::global("app-test")),
            Arc::new(BroadcastRecorder::new()),
            Arc::new(KeptnMeters::global()),
            RequeuePolicy::default(),
        ));
        let reconciler = AppVersionReconciler::new(store.clone(), store, Arc::new(DefinitionlessRunner), driver);

        let requeue = reconciler
            .reconcile(&ObjectKey::new("demo", "ghost-1.0.0"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(requeue, Requeue::Never);
    }
}
