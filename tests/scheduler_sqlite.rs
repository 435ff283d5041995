mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use lifecycle_operator::lifecycle::{EntityKind, LifecycleEntity, WorkloadRef};
use lifecycle_operator::reconciler::{DefinitionlessRunner, PhaseDriver, RequeuePolicy};
use lifecycle_operator::telemetry::SpanBinder;
use lifecycle_operator::{
    AppVersionReconciler, ApplicationVersion, KeptnState, OperatorConfig, Scheduler, SqliteStore, Store,
    WorkloadInstance, WorkloadInstanceReconciler,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scheduler_drives_rollout_to_completion() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(SqliteStore::new(dir.path().join("lifecycle.db")).await?);

    let app = ApplicationVersion::new("demo", "app", "1.0.0", vec![WorkloadRef::new("workload1", "1.0.0")]);
    let app = store.create(&app).await?;
    let wi = store
        .create(&WorkloadInstance::new("demo", "app", "workload1", "1.0.0"))
        .await?;

    let config = OperatorConfig {
        poll_interval_ms: 10,
        requeue: RequeuePolicy {
            phase_poll_secs: 0,
            dependency_missing_secs: 0,
            dependency_pending_secs: 0,
            phase_failed_secs: 0,
        },
        ..Default::default()
    };

    let events = Arc::new(common::RecordingEvents::default());
    let meters = Arc::new(common::RecordingMeters::default());
    let driver = Arc::new(PhaseDriver::new(
        Arc::new(SpanBinder::global("scheduler-test")),
        events,
        meters.clone(),
        config.requeue,
    ));
    let checks = Arc::new(DefinitionlessRunner);
    let apps: Arc<dyn Store<ApplicationVersion>> = store.clone();
    let workloads: Arc<dyn Store<WorkloadInstance>> = store.clone();

    let scheduler = Arc::new(Scheduler::new(
        &config,
        apps.clone(),
        workloads.clone(),
        Arc::new(AppVersionReconciler::new(apps.clone(), workloads.clone(), checks.clone(), driver.clone())),
        Arc::new(WorkloadInstanceReconciler::new(workloads, apps, checks, driver)),
    ));

    let cancel = CancellationToken::new();
    let running = {
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    };

    let finished = tokio::time::timeout(Duration::from_secs(20), async {
        loop {
            let current: ApplicationVersion = store.get(&app.key()).await.unwrap();
            if current.status.lifecycle.status == KeptnState::Succeeded {
                return current;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await?;

    cancel.cancel();
    let stats = running.await?;

    let instance: WorkloadInstance = store.get(&wi.key()).await?;
    assert_eq!(instance.status.lifecycle.status, KeptnState::Succeeded);
    assert_eq!(finished.status.workload_status[0].status, KeptnState::Succeeded);
    assert!(stats.reconciles >= 12);
    assert_eq!(meters.count(EntityKind::AppVersion), 1);
    assert_eq!(meters.count(EntityKind::WorkloadInstance), 1);
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.panics, 0);
    Ok(())
}
