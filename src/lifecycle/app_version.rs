//! Application Version
//!
//! The application aggregate: one rollout of an application at a version,
//! gating the workload instances it declares.

use serde::{Deserialize, Serialize};

use super::entity::{EntityKind, LifecycleEntity, LifecycleStatus, ObjectMeta, TraceCarrier};
use super::phase::{KeptnPhase, PhaseKind, APP_PHASES};
use super::state::KeptnState;

/// A workload declared by an application version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRef {
    /// Short workload name, without the application prefix.
    pub name: String,
    pub version: String,
}

impl WorkloadRef {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadStatus {
    pub workload: WorkloadRef,
    pub status: KeptnState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppVersionSpec {
    pub app_name: String,
    pub version: String,
    pub previous_version: Option<String>,
    pub workloads: Vec<WorkloadRef>,
    pub pre_deployment_tasks: Vec<String>,
    pub post_deployment_tasks: Vec<String>,
    pub pre_deployment_evaluations: Vec<String>,
    pub post_deployment_evaluations: Vec<String>,
    pub trace_id: TraceCarrier,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppVersionStatus {
    #[serde(flatten)]
    pub lifecycle: LifecycleStatus,
    pub pre_deployment_status: KeptnState,
    pub pre_deployment_evaluation_status: KeptnState,
    pub workload_overall_status: KeptnState,
    pub workload_status: Vec<WorkloadStatus>,
    pub post_deployment_status: KeptnState,
    pub post_deployment_evaluation_status: KeptnState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationVersion {
    pub metadata: ObjectMeta,
    pub spec: AppVersionSpec,
    pub status: AppVersionStatus,
}

impl ApplicationVersion {
    /// Builds a fresh, all-Pending application version named `<app>-<version>`.
    pub fn new(
        namespace: impl Into<String>,
        app_name: impl Into<String>,
        version: impl Into<String>,
        workloads: Vec<WorkloadRef>,
    ) -> Self {
        let app_name = app_name.into();
        let version = version.into();
        Self {
            metadata: ObjectMeta {
                name: format!("{}-{}", app_name, version),
                namespace: namespace.into(),
                ..Default::default()
            },
            spec: AppVersionSpec {
                app_name,
                version,
                workloads,
                ..Default::default()
            },
            status: AppVersionStatus::default(),
        }
    }

    /// Composite name a workload instance of this application carries.
    pub fn workload_name(&self, workload: &WorkloadRef) -> String {
        format!("{}-{}", self.spec.app_name, workload.name)
    }

    /// Whether this version declares the workload `workload_name` at `version`.
    pub fn declares_workload(&self, workload_name: &str, version: &str) -> bool {
        self.spec
            .workloads
            .iter()
            .any(|w| w.version == version && self.workload_name(w) == workload_name)
    }

    pub fn is_pre_deployment_succeeded(&self) -> bool {
        self.status.pre_deployment_status.is_succeeded()
    }

    pub fn is_pre_deployment_failed(&self) -> bool {
        self.status.pre_deployment_status.is_failed()
    }

    pub fn is_pre_deployment_evaluation_succeeded(&self) -> bool {
        self.status.pre_deployment_evaluation_status.is_succeeded()
    }

    pub fn is_pre_deployment_evaluation_failed(&self) -> bool {
        self.status.pre_deployment_evaluation_status.is_failed()
    }

    pub fn are_workloads_succeeded(&self) -> bool {
        self.status.workload_overall_status.is_succeeded()
    }

    pub fn are_workloads_failed(&self) -> bool {
        self.status.workload_overall_status.is_failed()
    }

    pub fn is_post_deployment_succeeded(&self) -> bool {
        self.status.post_deployment_status.is_succeeded()
    }

    pub fn is_post_deployment_failed(&self) -> bool {
        self.status.post_deployment_status.is_failed()
    }

    pub fn is_post_deployment_evaluation_succeeded(&self) -> bool {
        self.status.post_deployment_evaluation_status.is_succeeded()
    }

    pub fn is_post_deployment_evaluation_failed(&self) -> bool {
        self.status.post_deployment_evaluation_status.is_failed()
    }
}

impl LifecycleEntity for ApplicationVersion {
    const KIND: EntityKind = EntityKind::AppVersion;

    fn phases() -> &'static [KeptnPhase] {
        &APP_PHASES
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn app_name(&self) -> &str {
        &self.spec.app_name
    }

    fn workload_name(&self) -> Option<&str> {
        None
    }

    fn version(&self) -> &str {
        &self.spec.version
    }

    fn previous_version(&self) -> Option<&str> {
        self.spec.previous_version.as_deref()
    }

    fn trace_id(&self) -> &TraceCarrier {
        &self.spec.trace_id
    }

    fn lifecycle(&self) -> &LifecycleStatus {
        &self.status.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut LifecycleStatus {
        &mut self.status.lifecycle
    }

    fn phase_state(&self, phase: &KeptnPhase) -> KeptnState {
        match phase.kind {
            PhaseKind::PreDeployment => self.status.pre_deployment_status,
            PhaseKind::PreEvaluation => self.status.pre_deployment_evaluation_status,
            PhaseKind::Deployment => self.status.workload_overall_status,
            PhaseKind::PostDeployment => self.status.post_deployment_status,
            PhaseKind::PostEvaluation => self.status.post_deployment_evaluation_status,
            PhaseKind::Completed => self.status.lifecycle.status,
        }
    }

    fn phase_state_mut(&mut self, kind: PhaseKind) -> Option<&mut KeptnState> {
        match kind {
            PhaseKind::PreDeployment => Some(&mut self.status.pre_deployment_status),
            PhaseKind::PreEvaluation => Some(&mut self.status.pre_deployment_evaluation_status),
            PhaseKind::Deployment => Some(&mut self.status.workload_overall_status),
            PhaseKind::PostDeployment => Some(&mut self.status.post_deployment_status),
            PhaseKind::PostEvaluation => Some(&mut self.status.post_deployment_evaluation_status),
            PhaseKind::Completed => None,
        }
    }

    fn definitions(&self, kind: PhaseKind) -> &[String] {
        match kind {
            PhaseKind::PreDeployment => &self.spec.pre_deployment_tasks,
            PhaseKind::PreEvaluation => &self.spec.pre_deployment_evaluations,
            PhaseKind::PostDeployment => &self.spec.post_deployment_tasks,
            PhaseKind::PostEvaluation => &self.spec.post_deployment_evaluations,
            PhaseKind::Deployment | PhaseKind::Completed => &[],
        }
    }

    fn copy_status_from(&mut self, other: &Self) {
        self.status = other.status.clone();
    }
}
