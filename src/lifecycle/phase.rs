//! Phase Table
//!
//! Static, ordered catalog of the lifecycle phases an entity moves through.

use serde::Serialize;

/// Which slot of an entity's status a phase reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PhaseKind {
    PreDeployment,
    PreEvaluation,
    /// Workload fan-out for applications, the rollout itself for workloads.
    Deployment,
    PostDeployment,
    PostEvaluation,
    /// Synthetic terminal phase, never evaluated.
    Completed,
}

/// One entry of the phase table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct KeptnPhase {
    pub kind: PhaseKind,
    pub short_name: &'static str,
    pub long_name: &'static str,
    pub ordinal: u8,
}

impl KeptnPhase {
    const fn new(kind: PhaseKind, short_name: &'static str, long_name: &'static str, ordinal: u8) -> Self {
        Self { kind, short_name, long_name, ordinal }
    }

    pub fn is_completed(&self) -> bool {
        self.kind == PhaseKind::Completed
    }
}

impl std::fmt::Display for KeptnPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short_name)
    }
}

pub const APP_PRE_DEPLOYMENT: KeptnPhase =
    KeptnPhase::new(PhaseKind::PreDeployment, "AppPreDeployTasks", "App Pre-Deployment Tasks", 0);
pub const APP_PRE_EVALUATION: KeptnPhase =
    KeptnPhase::new(PhaseKind::PreEvaluation, "AppPreDeployEvaluations", "App Pre-Deployment Evaluations", 1);
pub const APP_DEPLOYMENT: KeptnPhase =
    KeptnPhase::new(PhaseKind::Deployment, "AppDeploy", "App Deployment", 2);
pub const APP_POST_DEPLOYMENT: KeptnPhase =
    KeptnPhase::new(PhaseKind::PostDeployment, "AppPostDeployTasks", "App Post-Deployment Tasks", 3);
pub const APP_POST_EVALUATION: KeptnPhase =
    KeptnPhase::new(PhaseKind::PostEvaluation, "AppPostDeployEvaluations", "App Post-Deployment Evaluations", 4);

pub const WORKLOAD_PRE_DEPLOYMENT: KeptnPhase =
    KeptnPhase::new(PhaseKind::PreDeployment, "WorkloadPreDeployTasks", "Workload Pre-Deployment Tasks", 0);
pub const WORKLOAD_PRE_EVALUATION: KeptnPhase = KeptnPhase::new(
    PhaseKind::PreEvaluation,
    "WorkloadPreDeployEvaluations",
    "Workload Pre-Deployment Evaluations",
    1,
);
pub const WORKLOAD_DEPLOYMENT: KeptnPhase =
    KeptnPhase::new(PhaseKind::Deployment, "WorkloadDeploy", "Workload Deployment", 2);
pub const WORKLOAD_POST_DEPLOYMENT: KeptnPhase =
    KeptnPhase::new(PhaseKind::PostDeployment, "WorkloadPostDeployTasks", "Workload Post-Deployment Tasks", 3);
pub const WORKLOAD_POST_EVALUATION: KeptnPhase = KeptnPhase::new(
    PhaseKind::PostEvaluation,
    "WorkloadPostDeployEvaluations",
    "Workload Post-Deployment Evaluations",
    4,
);

pub const COMPLETED: KeptnPhase = KeptnPhase::new(PhaseKind::Completed, "Completed", "Completed", 5);

/// Evaluated phases of an application version, in order.
pub const APP_PHASES: [KeptnPhase; 5] = [
    APP_PRE_DEPLOYMENT,
    APP_PRE_EVALUATION,
    APP_DEPLOYMENT,
    APP_POST_DEPLOYMENT,
    APP_POST_EVALUATION,
];

/// Evaluated phases of a workload instance, in order.
pub const WORKLOAD_PHASES: [KeptnPhase; 5] = [
    WORKLOAD_PRE_DEPLOYMENT,
    WORKLOAD_PRE_EVALUATION,
    WORKLOAD_DEPLOYMENT,
    WORKLOAD_POST_DEPLOYMENT,
    WORKLOAD_POST_EVALUATION,
];
