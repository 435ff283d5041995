//! Object Store Interface and Implementations
//!
//! Version-checked persistence for lifecycle entities. Every write carries the
//! resource version the caller read; a mismatch is rejected as a conflict.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::lifecycle::{EntityKind, LifecycleEntity, ObjectKey};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: EntityKind, key: ObjectKey },
    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: EntityKind, key: ObjectKey },
    #[error("conflict writing {kind} {key}: read resource version {expected}, stored {actual}")]
    Conflict {
        kind: EntityKind,
        key: ObjectKey,
        expected: u64,
        actual: u64,
    },
    #[error("could not encode or decode object: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// The persistence contract consumed by the reconcilers.
#[async_trait]
pub trait Store<E: LifecycleEntity>: Send + Sync {
    /// Loads one entity. A missing entity is `StoreError::NotFound`.
    async fn get(&self, key: &ObjectKey) -> Result<E, StoreError>;

    /// Lists entities of this kind, optionally restricted to one namespace.
    async fn list(&self, namespace: Option<&str>) -> Result<Vec<E>, StoreError>;

    /// Inserts a new entity and returns it with its first resource version.
    async fn create(&self, entity: &E) -> Result<E, StoreError>;

    /// Replaces the whole entity. Returns the new resource version.
    async fn update(&self, entity: &E) -> Result<u64, StoreError>;

    /// Replaces only the status, keeping the stored spec. Returns the new resource version.
    async fn update_status(&self, entity: &E) -> Result<u64, StoreError>;
}
