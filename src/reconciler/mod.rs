//! Reconciler Module
//!
//! The phase-gated reconciliation engine: one generic phase driver and the two
//! entity reconcilers built on it.

pub mod app_version;
pub mod checks;
pub mod driver;
pub mod gauges;
pub mod resolver;
pub mod workload_instance;

pub use app_version::AppVersionReconciler;
pub use checks::{CheckRequest, CheckRunner, CheckType, DefinitionlessRunner};
pub use driver::{PhaseDriver, PhaseHandler, ReconcileContext};
pub use resolver::AppVersionResolver;
pub use workload_instance::WorkloadInstanceReconciler;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::lifecycle::{EntityKind, ObjectKey};
use crate::store::StoreError;

/// Retry directive returned to whoever schedules reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// Nothing left to do until the entity changes.
    Never,
    /// Run again as soon as possible.
    Immediately,
    After(Duration),
}

/// Backoff tiers, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequeuePolicy {
    /// After a phase was attempted and did not error.
    pub phase_poll_secs: u64,
    /// Owning application version missing or unreadable.
    pub dependency_missing_secs: u64,
    /// Owning application's pre-deployment evaluation still running.
    pub dependency_pending_secs: u64,
    /// Phase, or the owning application's gate, already failed.
    pub phase_failed_secs: u64,
}

impl Default for RequeuePolicy {
    fn default() -> Self {
        Self {
            phase_poll_secs: 5,
            dependency_missing_secs: 10,
            dependency_pending_secs: 20,
            phase_failed_secs: 60,
        }
    }
}

impl RequeuePolicy {
    pub fn phase_poll(&self) -> Requeue {
        Requeue::After(Duration::from_secs(self.phase_poll_secs))
    }

    pub fn dependency_missing(&self) -> Requeue {
        Requeue::After(Duration::from_secs(self.dependency_missing_secs))
    }

    pub fn dependency_pending(&self) -> Requeue {
        Requeue::After(Duration::from_secs(self.dependency_pending_secs))
    }

    pub fn phase_failed(&self) -> Requeue {
        Requeue::After(Duration::from_secs(self.phase_failed_secs))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("could not fetch {kind} {key}: {source}")]
    Load {
        kind: EntityKind,
        key: ObjectKey,
        source: StoreError,
    },
    #[error("could not fetch AppVersion for KeptnWorkloadInstance {key}: {source}")]
    AppVersionLookup { key: ObjectKey, source: StoreError },
    #[error("could not find AppVersion for KeptnWorkloadInstance {key}")]
    AppVersionNotFound { key: ObjectKey },
    #[error("{phase} could not get reconciled: {source}")]
    Phase {
        phase: &'static str,
        source: anyhow::Error,
    },
    #[error("could not update status of {key}: {source}")]
    Persist { key: ObjectKey, source: StoreError },
}

impl ReconcileError {
    /// The retry directive that accompanies this error.
    pub fn requeue(&self, policy: &RequeuePolicy) -> Requeue {
        match self {
            ReconcileError::AppVersionLookup { .. } | ReconcileError::AppVersionNotFound { .. } => {
                policy.dependency_missing()
            }
            ReconcileError::Load { .. } | ReconcileError::Phase { .. } | ReconcileError::Persist { .. } => {
                Requeue::Immediately
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_tiers() {
        let policy = RequeuePolicy::default();
        assert_eq!(policy.phase_poll(), Requeue::After(Duration::from_secs(5)));
        assert_eq!(policy.dependency_missing(), Requeue::After(Duration::from_secs(10)));
        assert_eq!(policy.dependency_pending(), Requeue::After(Duration::from_secs(20)));
        assert_eq!(policy.phase_failed(), Requeue::After(Duration::from_secs(60)));
    }

    #[test]
    fn test_error_requeue_mapping() {
        let policy = RequeuePolicy::default();
        let key = ObjectKey::new("demo", "app-workload1-1.0.0");
        let missing = ReconcileError::AppVersionNotFound { key: key.clone() };
        assert_eq!(missing.requeue(&policy), Requeue::After(Duration::from_secs(10)));

        let phase = ReconcileError::Phase {
            phase: "WorkloadDeploy",
            source: anyhow::anyhow!("task engine unreachable"),
        };
        assert_eq!(phase.requeue(&policy), Requeue::Immediately);
        assert!(phase.to_string().contains("task engine unreachable"));
    }
}
