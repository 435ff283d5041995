//! Lifecycle Module
//!
//! Data model of the rollout lifecycle: phases, states and the two entity kinds.

pub mod app_version;
pub mod entity;
pub mod phase;
pub mod state;
pub mod version;
pub mod workload_instance;

pub use app_version::{AppVersionSpec, AppVersionStatus, ApplicationVersion, WorkloadRef, WorkloadStatus};
pub use entity::{EntityKind, LifecycleEntity, LifecycleStatus, ObjectKey, ObjectMeta, TraceCarrier};
pub use phase::{KeptnPhase, PhaseKind};
pub use state::{KeptnState, StatusSummary};
pub use workload_instance::{WorkloadInstance, WorkloadInstanceSpec, WorkloadInstanceStatus};
