//! SQLite-backed store.
//!
//! One row per object; writes are guarded by `WHERE resource_version = ?` so a
//! stale writer loses instead of clobbering.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task;

use super::{Store, StoreError};
use crate::lifecycle::{LifecycleEntity, ObjectKey};

#[derive(Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

fn backend(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Concurrent reconciles share the file; wait for the write lock instead of failing.
fn connect(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

impl SqliteStore {
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = db_path.as_ref().to_path_buf();
        let path_clone = path.clone();

        task::spawn_blocking(move || {
            let conn = connect(&path_clone)?;

            conn.execute(
                r#"
                CREATE TABLE IF NOT EXISTS objects (
                    kind TEXT NOT NULL,
                    namespace TEXT NOT NULL,
                    name TEXT NOT NULL,
                    resource_version INTEGER NOT NULL,
                    body TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (kind, namespace, name)
                );
                "#,
                [],
            )?;

            conn.execute("CREATE INDEX IF NOT EXISTS idx_kind_namespace ON objects(kind, namespace);", [])?;

            Ok::<_, rusqlite::Error>(())
        })
        .await
        .map_err(backend)?
        .map_err(backend)?;

        Ok(Self { db_path: path })
    }

    fn decode<E: LifecycleEntity>(body: &str, resource_version: i64) -> Result<E, StoreError> {
        let mut entity: E = serde_json::from_str(body)?;
        entity.meta_mut().resource_version = resource_version as u64;
        Ok(entity)
    }

    async fn write<E, F>(&self, entity: &E, merge: F) -> Result<u64, StoreError>
    where
        E: LifecycleEntity,
        F: FnOnce(E, &E) -> E + Send + 'static,
    {
        let path = self.db_path.clone();
        let key = entity.key();
        let given = entity.clone();

        task::spawn_blocking(move || {
            let mut conn = connect(&path).map_err(backend)?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(backend)?;

            let row: Option<(i64, String)> = tx
                .query_row(
                    "SELECT resource_version, body FROM objects WHERE kind = ?1 AND namespace = ?2 AND name = ?3",
                    params![E::KIND.as_str(), &key.namespace, &key.name],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(backend)?;

            let (stored_version, body) = row.ok_or_else(|| StoreError::NotFound { kind: E::KIND, key: key.clone() })?;
            let expected = given.meta().resource_version;
            if stored_version as u64 != expected {
                return Err(StoreError::Conflict {
                    kind: E::KIND,
                    key,
                    expected,
                    actual: stored_version as u64,
                });
            }

            let stored: E = Self::decode(&body, stored_version)?;
            let mut next = merge(stored, &given);
            let version = expected + 1;
            next.meta_mut().resource_version = version;
            let body = serde_json::to_string(&next)?;

            let changed = tx
                .execute(
                    "UPDATE objects SET resource_version = ?1, body = ?2, updated_at = ?3
                     WHERE kind = ?4 AND namespace = ?5 AND name = ?6 AND resource_version = ?7",
                    params![
                        version as i64,
                        &body,
                        Utc::now().to_rfc3339(),
                        E::KIND.as_str(),
                        &key.namespace,
                        &key.name,
                        stored_version
                    ],
                )
                .map_err(backend)?;
            if changed == 0 {
                return Err(StoreError::Conflict {
                    kind: E::KIND,
                    key,
                    expected,
                    actual: expected + 1,
                });
            }
            tx.commit().map_err(backend)?;
            Ok(version)
        })
        .await
        .map_err(backend)?
    }
}

#[async_trait]
impl<E: LifecycleEntity> Store<E> for SqliteStore {
    async fn get(&self, key: &ObjectKey) -> Result<E, StoreError> {
        let path = self.db_path.clone();
        let key = key.clone();

        task::spawn_blocking(move || {
            let conn = connect(&path).map_err(backend)?;
            let row: Option<(i64, String)> = conn
                .query_row(
                    "SELECT resource_version, body FROM objects WHERE kind = ?1 AND namespace = ?2 AND name = ?3",
                    params![E::KIND.as_str(), &key.namespace, &key.name],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(backend)?;
            match row {
                Some((version, body)) => Self::decode(&body, version),
                None => Err(StoreError::NotFound { kind: E::KIND, key }),
            }
        })
        .await
        .map_err(backend)?
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<E>, StoreError> {
        let path = self.db_path.clone();
        let namespace = namespace.map(str::to_string);

        task::spawn_blocking(move || {
            let conn = connect(&path).map_err(backend)?;
            let mut stmt = conn
                .prepare(
                    "SELECT resource_version, body FROM objects
                     WHERE kind = ?1 AND (?2 IS NULL OR namespace = ?2)
                     ORDER BY namespace, name",
                )
                .map_err(backend)?;
            let rows = stmt
                .query_map(params![E::KIND.as_str(), namespace], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(backend)?;

            let mut entities = Vec::new();
            for row in rows {
                let (version, body) = row.map_err(backend)?;
                entities.push(Self::decode(&body, version)?);
            }
            Ok(entities)
        })
        .await
        .map_err(backend)?
    }

    async fn create(&self, entity: &E) -> Result<E, StoreError> {
        let path = self.db_path.clone();
        let mut created = entity.clone();
        created.meta_mut().resource_version = 1;
        let body = serde_json::to_string(&created)?;
        let key = created.key();

        task::spawn_blocking(move || {
            let conn = connect(&path).map_err(backend)?;
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO objects (kind, namespace, name, resource_version, body, updated_at)
                     VALUES (?1, ?2, ?3, 1, ?4, ?5)",
                    params![E::KIND.as_str(), &key.namespace, &key.name, &body, Utc::now().to_rfc3339()],
                )
                .map_err(backend)?;
            if inserted == 0 {
                return Err(StoreError::AlreadyExists { kind: E::KIND, key });
            }
            Ok(created)
        })
        .await
        .map_err(backend)?
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

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("db_path", &self.db_path).finish()
    }
}
