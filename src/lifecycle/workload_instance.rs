//! Workload Instance
//!
//! One workload of an application at one version.

use serde::{Deserialize, Serialize};

use super::entity::{EntityKind, LifecycleEntity, LifecycleStatus, ObjectMeta, TraceCarrier};
use super::phase::{KeptnPhase, PhaseKind, WORKLOAD_PHASES};
use super::state::KeptnState;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadInstanceSpec {
    pub app_name: String,
    /// Composite `<app>-<workload>` name.
    pub workload_name: String,
    pub version: String,
    pub previous_version: Option<String>,
    pub pre_deployment_tasks: Vec<String>,
    pub post_deployment_tasks: Vec<String>,
    pub pre_deployment_evaluations: Vec<String>,
    pub post_deployment_evaluations: Vec<String>,
    /// Copied from the owning application version once the gate clears.
    pub trace_id: TraceCarrier,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadInstanceStatus {
    #[serde(flatten)]
    pub lifecycle: LifecycleStatus,
    pub pre_deployment_status: KeptnState,
    pub pre_deployment_evaluation_status: KeptnState,
    pub deployment_status: KeptnState,
    pub post_deployment_status: KeptnState,
    pub post_deployment_evaluation_status: KeptnState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadInstance {
    pub metadata: ObjectMeta,
    pub spec: WorkloadInstanceSpec,
    pub status: WorkloadInstanceStatus,
}

impl WorkloadInstance {
    /// Builds a fresh, all-Pending instance of `<app>-<workload>` at `version`.
    pub fn new(
        namespace: impl Into<String>,
        app_name: impl Into<String>,
        workload: &str,
        version: impl Into<String>,
    ) -> Self {
        let app_name = app_name.into();
        let version = version.into();
        let workload_name = format!("{}-{}", app_name, workload);
        Self {
            metadata: ObjectMeta {
                name: Self::instance_name(&workload_name, &version),
                namespace: namespace.into(),
                ..Default::default()
            },
            spec: WorkloadInstanceSpec {
                app_name,
                workload_name,
                version,
                ..Default::default()
            },
            status: WorkloadInstanceStatus::default(),
        }
    }

    /// Store name of the instance of `workload_name` at `version`.
    pub fn instance_name(workload_name: &str, version: &str) -> String {
        format!("{}-{}", workload_name, version)
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

    pub fn is_deployment_succeeded(&self) -> bool {
        self.status.deployment_status.is_succeeded()
    }

    pub fn is_deployment_failed(&self) -> bool {
        self.status.deployment_status.is_failed()
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

impl LifecycleEntity for WorkloadInstance {
    const KIND: EntityKind = EntityKind::WorkloadInstance;

    fn phases() -> &'static [KeptnPhase] {
        &WORKLOAD_PHASES
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
        Some(&self.spec.workload_name)
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
            PhaseKind::Deployment => self.status.deployment_status,
            PhaseKind::PostDeployment => self.status.post_deployment_status,
            PhaseKind::PostEvaluation => self.status.post_deployment_evaluation_status,
            PhaseKind::Completed => self.status.lifecycle.status,
        }
    }

    fn phase_state_mut(&mut self, kind: PhaseKind) -> Option<&mut KeptnState> {
        match kind {
            PhaseKind::PreDeployment => Some(&mut self.status.pre_deployment_status),
            PhaseKind::PreEvaluation => Some(&mut self.status.pre_deployment_evaluation_status),
            PhaseKind::Deployment => Some(&mut self.status.deployment_status),
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
