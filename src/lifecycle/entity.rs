//! Lifecycle Entities
//!
//! Identity, persisted lifecycle bookkeeping and the capability trait shared by
//! application versions and workload instances.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::phase::{KeptnPhase, PhaseKind};
use super::state::KeptnState;

/// Flat string map carrying a W3C trace context.
pub type TraceCarrier = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    AppVersion,
    WorkloadInstance,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::AppVersion => "KeptnAppVersion",
            EntityKind::WorkloadInstance => "KeptnWorkloadInstance",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store address of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    /// Caller trace context, extracted on every reconcile.
    pub annotations: HashMap<String, String>,
    /// Bumped by the store on every accepted write.
    pub resource_version: u64,
}

/// Bookkeeping common to both entity kinds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleStatus {
    /// Short name of the phase most recently attempted.
    pub current_phase: String,
    pub status: KeptnState,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl LifecycleStatus {
    /// Stamps the start time once. Returns true if it was unset.
    pub fn set_start_time(&mut self) -> bool {
        if self.start_time.is_some() {
            return false;
        }
        self.start_time = Some(Utc::now());
        true
    }

    /// Stamps the end time once. Returns true if it was unset.
    pub fn set_end_time(&mut self) -> bool {
        if self.end_time.is_some() {
            return false;
        }
        self.end_time = Some(Utc::now());
        true
    }

    pub fn is_end_time_set(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn duration_secs(&self) -> Option<f64> {
        let start = self.start_time?;
        let end = self.end_time?;
        Some((end - start).num_milliseconds() as f64 / 1000.0)
    }
}

/// Capability interface the phase driver is written against.
pub trait LifecycleEntity: Clone + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static {
    const KIND: EntityKind;

    /// Evaluated phases, in the order they must succeed.
    fn phases() -> &'static [KeptnPhase];

    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn app_name(&self) -> &str;
    /// Composite `<app>-<workload>` name; `None` for application versions.
    fn workload_name(&self) -> Option<&str>;
    fn version(&self) -> &str;
    fn previous_version(&self) -> Option<&str>;

    /// Application-level trace context used to continue phase spans.
    fn trace_id(&self) -> &TraceCarrier;

    fn lifecycle(&self) -> &LifecycleStatus;
    fn lifecycle_mut(&mut self) -> &mut LifecycleStatus;

    fn phase_state(&self, phase: &KeptnPhase) -> KeptnState;
    /// Status slot of an evaluated phase; `None` for the synthetic Completed phase.
    fn phase_state_mut(&mut self, kind: PhaseKind) -> Option<&mut KeptnState>;

    /// Task or evaluation definitions declared for a phase.
    fn definitions(&self, kind: PhaseKind) -> &[String];

    /// Overwrites this entity's status with `other`'s, leaving spec and metadata.
    fn copy_status_from(&mut self, other: &Self);

    fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.meta().namespace, &self.meta().name)
    }

    /// Name used for spans, events and gauges: the workload name, else the app name.
    fn display_name(&self) -> &str {
        self.workload_name().unwrap_or_else(|| self.app_name())
    }

    /// Store name of the previous version of this entity, if one is declared.
    fn previous_version_name(&self) -> Option<String> {
        self.previous_version()
            .filter(|v| !v.is_empty())
            .map(|v| format!("{}-{}", self.display_name(), v))
    }

    fn is_phase_succeeded(&self, phase: &KeptnPhase) -> bool {
        self.phase_state(phase).is_succeeded()
    }

    fn is_phase_failed(&self, phase: &KeptnPhase) -> bool {
        self.phase_state(phase).is_failed()
    }

    /// Moves a phase's status forward. Returns true if the stored value changed.
    fn advance_phase_state(&mut self, kind: PhaseKind, next: KeptnState) -> bool {
        match self.phase_state_mut(kind) {
            Some(slot) => {
                let advanced = slot.advance(next);
                let changed = advanced != *slot;
                *slot = advanced;
                changed
            }
            None => false,
        }
    }
}
