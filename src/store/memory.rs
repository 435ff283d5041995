//! In-process store keeping JSON documents behind a `RwLock`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{Store, StoreError};
use crate::lifecycle::{EntityKind, LifecycleEntity, ObjectKey};

#[derive(Debug, Clone)]
struct Record {
    resource_version: u64,
    body: serde_json::Value,
}

/// Shared in-memory store serving every entity kind.
#[derive(Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<(EntityKind, ObjectKey), Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn decode<E: LifecycleEntity>(record: &Record) -> Result<E, StoreError> {
        let mut entity: E = serde_json::from_value(record.body.clone())?;
        entity.meta_mut().resource_version = record.resource_version;
        Ok(entity)
    }

    async fn write<E, F>(&self, entity: &E, merge: F) -> Result<u64, StoreError>
    where
        E: LifecycleEntity,
        F: FnOnce(E, &E) -> E + Send,
    {
        let key = entity.key();
        let mut objects = self.objects.write().await;
        let record = objects
            .get_mut(&(E::KIND, key.clone()))
            .ok_or_else(|| StoreError::NotFound { kind: E::KIND, key: key.clone() })?;

        let expected = entity.meta().resource_version;
        if record.resource_version != expected {
            return Err(StoreError::Conflict {
                kind: E::KIND,
                key,
                expected,
                actual: record.resource_version,
            });
        }

        let stored: E = Self::decode(record)?;
        let mut next = merge(stored, entity);
        let version = record.resource_version + 1;
        next.meta_mut().resource_version = version;
        record.body = serde_json::to_value(&next)?;
        record.resource_version = version;
        Ok(version)
    }
}

#[async_trait]
impl<E: LifecycleEntity> Store<E> for MemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<E, StoreError> {
        let objects = self.objects.read().await;
        let record = objects
            .get(&(E::KIND, key.clone()))
            .ok_or_else(|| StoreError::NotFound { kind: E::KIND, key: key.clone() })?;
        Self::decode(record)
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<E>, StoreError> {
        let objects = self.objects.read().await;
        let mut matching: Vec<(&ObjectKey, &Record)> = objects
            .iter()
            .filter(|((kind, key), _)| *kind == E::KIND && namespace.map_or(true, |ns| key.namespace == ns))
            .map(|((_, key), record)| (key, record))
            .collect();
        matching.sort_by(|a, b| a.0.cmp(b.0));
        matching.into_iter().map(|(_, record)| Self::decode(record)).collect()
    }

    async fn create(&self, entity: &E) -> Result<E, StoreError> {
        let key = entity.key();
        let mut objects = self.objects.write().await;
        if objects.contains_key(&(E::KIND, key.clone())) {
            return Err(StoreError::AlreadyExists { kind: E::KIND, key });
        }
        let mut created = entity.clone();
        created.meta_mut().resource_version = 1;
        objects.insert(
            (E::KIND, key),
            Record {
                resource_version: 1,
                body: serde_json::to_value(&created)?,
            },
        );
        Ok(created)
    }

    async fn update(&self, entity: &E) -> Result<u64, StoreError> {
        self.write(entity, |_, given| given.clone()).await
    }

    async fn update_status(&self, entity: &E) -> Result<u64, StoreError> {
        self.write(entity, |mut stored, given| {
            stored.copy_status_from(given);
            stored
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{ApplicationVersion, KeptnState, WorkloadInstance};

    #[tokio::test]
    async fn test_create_get_and_not_found() {
        let store = MemoryStore::new();
        let app = ApplicationVersion::new("demo", "podtato", "1.0.0", vec![]);
        let created = store.create(&app).await.unwrap();
        assert_eq!(created.metadata.resource_version, 1);

        let loaded: ApplicationVersion = store.get(&app.key()).await.unwrap();
        assert_eq!(loaded.spec.app_name, "podtato");

        let missing: Result<WorkloadInstance, _> = store.get(&app.key()).await;
        assert!(missing.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_stale_write_is_a_conflict() {
        let store = MemoryStore::new();
        let app = store
            .create(&ApplicationVersion::new("demo", "podtato", "1.0.0", vec![]))
            .await
            .unwrap();

        let mut first = app.clone();
        first.status.lifecycle.status = KeptnState::Progressing;
        assert_eq!(store.update_status(&first).await.unwrap(), 2);

        let mut stale = app.clone();
        stale.status.lifecycle.status = KeptnState::Failed;
        let err = store.update_status(&stale).await.unwrap_err();
        assert!(err.is_conflict());

        let loaded: ApplicationVersion = store.get(&app.key()).await.unwrap();
        assert_eq!(loaded.status.lifecycle.status, KeptnState::Progressing);
    }

    #[tokio::test]
    async fn test_update_status_keeps_stored_spec() {
        let store = MemoryStore::new();
        let wi = store
            .create(&WorkloadInstance::new("demo", "app", "workload1", "1.0.0"))
            .await
            .unwrap();

        let mut changed = wi.clone();
        changed.spec.trace_id.insert("traceparent".into(), "00-abc-def-01".into());
        changed.status.pre_deployment_status = KeptnState::Progressing;
        store.update_status(&changed).await.unwrap();

        let loaded: WorkloadInstance = store.get(&wi.key()).await.unwrap();
        assert!(loaded.spec.trace_id.is_empty());
        assert_eq!(loaded.status.pre_deployment_status, KeptnState::Progressing);
    }

    #[tokio::test]
    async fn test_list_filters_kind_and_namespace() {
        let store = MemoryStore::new();
        store.create(&ApplicationVersion::new("a", "x", "1.0.0", vec![])).await.unwrap();
        store.create(&ApplicationVersion::new("b", "x", "1.0.0", vec![])).await.unwrap();
        store.create(&WorkloadInstance::new("a", "x", "w", "1.0.0")).await.unwrap();

        let apps: Vec<ApplicationVersion> = store.list(Some("a")).await.unwrap();
        assert_eq!(apps.len(), 1);
        let all_apps: Vec<ApplicationVersion> = store.list(None).await.unwrap();
        assert_eq!(all_apps.len(), 2);
        assert_eq!(store.len().await, 3);
    }
}
