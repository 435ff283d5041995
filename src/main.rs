//! Lifecycle Operator
//!
//! Reconciles application versions and workload instances stored in a local
//! SQLite database until the process is interrupted.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use lifecycle_operator::reconciler::{DefinitionlessRunner, PhaseDriver};
use lifecycle_operator::telemetry::{init_telemetry, BroadcastRecorder, KeptnMeters, SpanBinder};
use lifecycle_operator::{
    AppVersionReconciler, ApplicationVersion, OperatorConfig, Scheduler, SqliteStore, Store, WorkloadInstance,
    WorkloadInstanceReconciler,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let config = OperatorConfig::from_env().await?;
    let _otel = init_telemetry(&config.service_name, config.otlp_enabled, &config.log_filter)?;

    info!(
        store = %config.store_path.display(),
        namespace = config.namespace.as_deref().unwrap_or("*"),
        "starting lifecycle operator"
    );

    let store = Arc::new(
        SqliteStore::new(&config.store_path)
            .await
            .with_context(|| format!("could not open store {}", config.store_path.display()))?,
    );
    let apps: Arc<dyn Store<ApplicationVersion>> = store.clone();
    let workloads: Arc<dyn Store<WorkloadInstance>> = store;

    let driver = Arc::new(PhaseDriver::new(
        Arc::new(SpanBinder::global("keptn/lifecycle")),
        Arc::new(BroadcastRecorder::new()),
        Arc::new(KeptnMeters::global()),
        config.requeue,
    ));
    let checks = Arc::new(DefinitionlessRunner);

    let app_reconciler = Arc::new(AppVersionReconciler::new(
        apps.clone(),
        workloads.clone(),
        checks.clone(),
        driver.clone(),
    ));
    let workload_reconciler = Arc::new(WorkloadInstanceReconciler::new(
        workloads.clone(),
        apps.clone(),
        checks,
        driver,
    ));

    let scheduler = Scheduler::new(&config, apps, workloads, app_reconciler, workload_reconciler);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "could not listen for interrupt");
            return;
        }
        info!("interrupt received, shutting down");
        shutdown.cancel();
    });

    let stats = scheduler.run(cancel).await;
    info!(
        reconciles = stats.reconciles,
        errors = stats.errors,
        panics = stats.panics,
        "lifecycle operator stopped"
    );
    Ok(())
}
