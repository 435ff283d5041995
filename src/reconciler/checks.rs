//! Phase checks: the tasks and evaluations behind the non-deployment phases.

use anyhow::bail;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::lifecycle::{EntityKind, KeptnState, LifecycleEntity, ObjectKey, PhaseKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckType {
    PreDeployment,
    PreDeploymentEvaluation,
    Deployment,
    PostDeployment,
    PostDeploymentEvaluation,
}

impl CheckType {
    pub fn for_phase(kind: PhaseKind) -> Option<Self> {
        match kind {
            PhaseKind::PreDeployment => Some(CheckType::PreDeployment),
            PhaseKind::PreEvaluation => Some(CheckType::PreDeploymentEvaluation),
            PhaseKind::Deployment => Some(CheckType::Deployment),
            PhaseKind::PostDeployment => Some(CheckType::PostDeployment),
            PhaseKind::PostEvaluation => Some(CheckType::PostDeploymentEvaluation),
            PhaseKind::Completed => None,
        }
    }
}

/// Everything a check engine needs to run one phase for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequest {
    pub kind: EntityKind,
    pub key: ObjectKey,
    pub app_name: String,
    pub workload_name: Option<String>,
    pub version: String,
    pub check_type: CheckType,
    pub definitions: Vec<String>,
}

impl CheckRequest {
    pub fn for_entity<E: LifecycleEntity>(entity: &E, kind: PhaseKind, check_type: CheckType) -> Self {
        Self {
            kind: E::KIND,
            key: entity.key(),
            app_name: entity.app_name().to_string(),
            workload_name: entity.workload_name().map(str::to_string),
            version: entity.version().to_string(),
            check_type,
            definitions: entity.definitions(kind).to_vec(),
        }
    }
}

/// Runs the tasks or evaluations of a phase and reports their combined state.
///
/// Called once per reconcile while the phase is open; implementations are
/// expected to start work on the first call and report progress afterwards.
#[async_trait]
pub trait CheckRunner: Send + Sync {
    async fn run(&self, request: &CheckRequest) -> anyhow::Result<KeptnState>;
}

/// Succeeds every phase that declares no definitions and refuses the rest.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefinitionlessRunner;

#[async_trait]
impl CheckRunner for DefinitionlessRunner {
    async fn run(&self, request: &CheckRequest) -> anyhow::Result<KeptnState> {
        if request.definitions.is_empty() {
            return Ok(KeptnState::Succeeded);
        }
        bail!(
            "no check engine configured to run {:?} {:?} for {} {}",
            request.check_type,
            request.definitions,
            request.kind,
            request.key
        )
    }
}
