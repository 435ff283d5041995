//! Shared harness for the lifecycle integration tests.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use opentelemetry::KeyValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use lifecycle_operator::lifecycle::{EntityKind, KeptnState, LifecycleEntity, ObjectKey};
use lifecycle_operator::reconciler::{CheckRequest, CheckRunner, CheckType, PhaseDriver, RequeuePolicy};
use lifecycle_operator::telemetry::{EventRecorder, LifecycleEvent, MetricsSink, SpanBinder};
use lifecycle_operator::store::StoreError;
use lifecycle_operator::{AppVersionReconciler, MemoryStore, Store, WorkloadInstanceReconciler};

/// Answers each check type with a configurable verdict; Succeeded by default.
#[derive(Default)]
pub struct ScriptedRunner {
    verdicts: Mutex<HashMap<CheckType, Result<KeptnState, String>>>,
    calls: Mutex<Vec<CheckRequest>>,
}

impl ScriptedRunner {
    pub fn answer(&self, check_type: CheckType, state: KeptnState) {
        self.verdicts.lock().unwrap().insert(check_type, Ok(state));
    }

    pub fn error(&self, check_type: CheckType, message: &str) {
        self.verdicts
            .lock()
            .unwrap()
            .insert(check_type, Err(message.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, check_type: CheckType) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.check_type == check_type)
            .count()
    }
}

#[async_trait]
impl CheckRunner for ScriptedRunner {
    async fn run(&self, request: &CheckRequest) -> Result<KeptnState> {
        self.calls.lock().unwrap().push(request.clone());
        match self.verdicts.lock().unwrap().get(&request.check_type) {
            Some(Ok(state)) => Ok(*state),
            Some(Err(message)) => Err(anyhow!(message.clone())),
            None => Ok(KeptnState::Succeeded),
        }
    }
}

#[derive(Default)]
pub struct RecordingMeters {
    pub counts: Mutex<Vec<(EntityKind, u64)>>,
    pub durations: Mutex<Vec<(EntityKind, f64)>>,
}

impl RecordingMeters {
    pub fn count(&self, kind: EntityKind) -> u64 {
        self.counts
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, v)| v)
            .sum()
    }

    pub fn durations(&self, kind: EntityKind) -> Vec<f64> {
        self.durations
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, v)| *v)
            .collect()
    }
}

impl MetricsSink for RecordingMeters {
    fn add_count(&self, kind: EntityKind, value: u64, _attributes: &[KeyValue]) {
        self.counts.lock().unwrap().push((kind, value));
    }

    fn record_duration(&self, kind: EntityKind, seconds: f64, _attributes: &[KeyValue]) {
        self.durations.lock().unwrap().push((kind, seconds));
    }
}

#[derive(Default)]
pub struct RecordingEvents {
    pub events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingEvents {
    pub fn reasons(&self) -> Vec<String> {
        self.events.lock().unwrap().iter().map(|e| e.reason.clone()).collect()
    }

    pub fn has(&self, reason: &str) -> bool {
        self.events.lock().unwrap().iter().any(|e| e.reason == reason)
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl EventRecorder for RecordingEvents {
    fn record(&self, event: LifecycleEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Passes everything through to a `MemoryStore`, but can be told to reject
/// the next status writes with a conflict.
pub struct RejectingStore {
    inner: Arc<MemoryStore>,
    rejections: AtomicUsize,
}

impl RejectingStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            rejections: AtomicUsize::new(0),
        }
    }

    pub fn reject_status_writes(&self, count: usize) {
        self.rejections.store(count, Ordering::SeqCst);
    }

    fn take_rejection(&self) -> bool {
        self.rejections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl<E: LifecycleEntity> Store<E> for RejectingStore {
    async fn get(&self, key: &ObjectKey) -> Result<E, StoreError> {
        self.inner.get(key).await
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<E>, StoreError> {
        self.inner.list(namespace).await
    }

    async fn create(&self, entity: &E) -> Result<E, StoreError> {
        self.inner.create(entity).await
    }

    async fn update(&self, entity: &E) -> Result<u64, StoreError> {
        self.inner.update(entity).await
    }

    async fn update_status(&self, entity: &E) -> Result<u64, StoreError> {
        if self.take_rejection() {
            let expected = entity.meta().resource_version;
            return Err(StoreError::Conflict {
                kind: E::KIND,
                key: entity.key(),
                expected,
                actual: expected + 1,
            });
        }
        self.inner.update_status(entity).await
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    /// The store the reconcilers write through.
    pub writes: Arc<RejectingStore>,
    pub runner: Arc<ScriptedRunner>,
    pub meters: Arc<RecordingMeters>,
    pub events: Arc<RecordingEvents>,
    pub binder: Arc<SpanBinder>,
    pub apps: AppVersionReconciler,
    pub workloads: WorkloadInstanceReconciler,
    pub cancel: CancellationToken,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::default());
        let writes = Arc::new(RejectingStore::new(store.clone()));
        let runner = Arc::new(ScriptedRunner::default());
        let meters = Arc::new(RecordingMeters::default());
        let events = Arc::new(RecordingEvents::default());
        let binder = Arc::new(SpanBinder::global("lifecycle-tests"));
        let driver = Arc::new(PhaseDriver::new(
            binder.clone(),
            events.clone(),
            meters.clone(),
            RequeuePolicy::default(),
        ));

        Self {
            apps: AppVersionReconciler::new(writes.clone(), writes.clone(), runner.clone(), driver.clone()),
            workloads: WorkloadInstanceReconciler::new(writes.clone(), writes.clone(), runner.clone(), driver),
            store,
            writes,
            runner,
            meters,
            events,
            binder,
            cancel: CancellationToken::new(),
        }
    }
}
