//! Lifecycle Operator
//!
//! A phase-gated reconciliation engine for application rollouts:
//! - Application versions and workload instances move through ordered phases
//! - Each reconcile advances at most one phase and returns a retry directive
//! - Workload instances wait on their application's pre-deployment evaluation
//! - Phase spans survive across reconciles and continue the rollout's trace
//! - Version-checked persistence (in-memory or SQLite)

pub mod config;
pub mod lifecycle;
pub mod reconciler;
pub mod scheduler;
pub mod store;
pub mod telemetry;

// Re-exports for convenience
pub use config::OperatorConfig;
pub use lifecycle::{ApplicationVersion, KeptnState, WorkloadInstance};
pub use reconciler::{AppVersionReconciler, PhaseDriver, Requeue, WorkloadInstanceReconciler};
pub use scheduler::Scheduler;
pub use store::{MemoryStore, SqliteStore, Store};
