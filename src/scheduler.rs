//! Reconcile Scheduler
//!
//! Polls the store, runs due reconciles with bounded concurrency and honours
//! the retry directive each one returns. An entity answered with
//! `Requeue::Never` is only revisited once its resource version moves.

use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::OperatorConfig;
use crate::lifecycle::{ApplicationVersion, EntityKind, LifecycleEntity, ObjectKey, WorkloadInstance};
use crate::reconciler::{gauges, AppVersionReconciler, ReconcileError, Requeue, RequeuePolicy, WorkloadInstanceReconciler};
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Target {
    kind: EntityKind,
    key: ObjectKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Due {
    At(Instant),
    /// Parked until the resource version differs from the one first seen
    /// after the reconcile that parked it.
    OnChange(Option<u64>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub reconciles: u64,
    pub errors: u64,
    pub panics: u64,
}

type Outcome = (Target, Result<Result<Requeue, ReconcileError>, String>);

pub struct Scheduler {
    apps: Arc<dyn Store<ApplicationVersion>>,
    workloads: Arc<dyn Store<WorkloadInstance>>,
    app_reconciler: Arc<AppVersionReconciler>,
    workload_reconciler: Arc<WorkloadInstanceReconciler>,
    policy: RequeuePolicy,
    namespace: Option<String>,
    poll_interval: Duration,
    permits: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(
        config: &OperatorConfig,
        apps: Arc<dyn Store<ApplicationVersion>>,
        workloads: Arc<dyn Store<WorkloadInstance>>,
        app_reconciler: Arc<AppVersionReconciler>,
        workload_reconciler: Arc<WorkloadInstanceReconciler>,
    ) -> Self {
        Self {
            apps,
            workloads,
            app_reconciler,
            workload_reconciler,
            policy: config.requeue,
            namespace: config.namespace.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(10)),
            permits: Arc::new(Semaphore::new(config.max_concurrent_reconciles.max(1))),
        }
    }

    /// Runs until `cancel` fires, then waits for in-flight reconciles.
    pub async fn run(&self, cancel: CancellationToken) -> SchedulerStats {
        let mut stats = SchedulerStats::default();
        let mut schedule: HashMap<Target, Due> = HashMap::new();
        let mut running: HashSet<Target> = HashSet::new();
        let mut join_set: JoinSet<Outcome> = JoinSet::new();
        let mut ticker = tokio::time::interval(self.poll_interval);

        info!(
            poll_ms = self.poll_interval.as_millis() as u64,
            permits = self.permits.available_permits(),
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(joined) = join_set.join_next(), if !join_set.is_empty() => {
                    self.settle(joined, &mut schedule, &mut running, &mut stats);
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.tick(&cancel, &mut schedule, &mut running, &mut join_set).await {
                        warn!(error = %err, "could not list entities");
                    }
                    self.log_gauges().await;
                }
            }
        }

        info!(in_flight = join_set.len(), "scheduler stopping");
        while let Some(joined) = join_set.join_next().await {
            self.settle(joined, &mut schedule, &mut running, &mut stats);
        }
        stats
    }

    async fn tick(
        &self,
        cancel: &CancellationToken,
        schedule: &mut HashMap<Target, Due>,
        running: &mut HashSet<Target>,
        join_set: &mut JoinSet<Outcome>,
    ) -> Result<(), StoreError> {
        let namespace = self.namespace.as_deref();
        let mut observed: Vec<(Target, u64)> = Vec::new();
        observed.extend(self.apps.list(namespace).await?.iter().map(observe));
        observed.extend(self.workloads.list(namespace).await?.iter().map(observe));

        prune(schedule, running, &observed);

        let now = Instant::now();
        for (target, resource_version) in observed {
            if running.contains(&target) || !is_due(schedule, &target, resource_version, now) {
                continue;
            }
            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                debug!("all reconcile permits in use");
                break;
            };

            running.insert(target.clone());
            let task_target = target.clone();
            let cancel = cancel.child_token();
            let apps = self.app_reconciler.clone();
            let workloads = self.workload_reconciler.clone();
            join_set.spawn(async move {
                let _permit = permit;
                let reconcile = async {
                    match task_target.kind {
                        EntityKind::AppVersion => apps.reconcile(&task_target.key, &cancel).await,
                        EntityKind::WorkloadInstance => workloads.reconcile(&task_target.key, &cancel).await,
                    }
                };
                let result = AssertUnwindSafe(reconcile).catch_unwind().await.map_err(|panic| {
                    panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string())
                });
                (task_target, result)
            });
        }
        Ok(())
    }

    fn settle(
        &self,
        joined: Result<Outcome, tokio::task::JoinError>,
        schedule: &mut HashMap<Target, Due>,
        running: &mut HashSet<Target>,
        stats: &mut SchedulerStats,
    ) {
        let (target, result) = match joined {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, "reconcile task aborted");
                return;
            }
        };
        running.remove(&target);
        stats.reconciles += 1;

        let requeue = match result {
            Ok(Ok(requeue)) => requeue,
            Ok(Err(err)) => {
                stats.errors += 1;
                warn!(kind = %target.kind, key = %target.key, error = %err, "reconcile failed");
                err.requeue(&self.policy)
            }
            Err(panic) => {
                stats.panics += 1;
                error!(kind = %target.kind, key = %target.key, panic = %panic, "reconcile panicked");
                self.policy.phase_failed()
            }
        };
        debug!(kind = %target.kind, key = %target.key, ?requeue, "reconcile settled");

        let due = match requeue {
            Requeue::Never => Due::OnChange(None),
            Requeue::Immediately => Due::At(Instant::now()),
            Requeue::After(delay) => Due::At(Instant::now() + delay),
        };
        schedule.insert(target, due);
    }

    async fn log_gauges(&self) {
        let apps = gauges::active_gauges(self.apps.as_ref()).await;
        let workloads = gauges::active_gauges(self.workloads.as_ref()).await;
        if let (Ok(apps), Ok(workloads)) = (apps, workloads) {
            debug!(
                active_apps = apps.iter().map(|g| g.value).sum::<i64>(),
                active_workloads = workloads.iter().map(|g| g.value).sum::<i64>(),
                "active rollouts"
            );
        }
    }
}

fn observe<E: LifecycleEntity>(entity: &E) -> (Target, u64) {
    (
        Target {
            kind: E::KIND,
            key: entity.key(),
        },
        entity.meta().resource_version,
    )
}

/// Forgets targets that are no longer listed, such as deleted entities.
fn prune(schedule: &mut HashMap<Target, Due>, running: &HashSet<Target>, observed: &[(Target, u64)]) {
    let listed: HashSet<&Target> = observed.iter().map(|(target, _)| target).collect();
    schedule.retain(|target, _| listed.contains(target) || running.contains(target));
}

fn is_due(schedule: &mut HashMap<Target, Due>, target: &Target, resource_version: u64, now: Instant) -> bool {
    match schedule.get_mut(target) {
        None => true,
        Some(Due::At(at)) => *at <= now,
        Some(Due::OnChange(seen @ None)) => {
            *seen = Some(resource_version);
            false
        }
        Some(Due::OnChange(Some(seen))) => *seen != resource_version,
    }
}
