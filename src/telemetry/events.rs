//! Operator-visible Lifecycle Events
//!
//! Fire-and-forget event sink. The broadcast recorder fans events out to any
//! number of subscribers and mirrors them into the log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::lifecycle::{EntityKind, KeptnPhase, LifecycleEntity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectReference {
    pub kind: EntityKind,
    pub namespace: String,
    pub name: String,
}

impl ObjectReference {
    pub fn of<E: LifecycleEntity>(entity: &E) -> Self {
        Self {
            kind: E::KIND,
            namespace: entity.meta().namespace.clone(),
            name: entity.meta().name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub object: ObjectReference,
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    /// Builds the event for `phase` on `entity`: reason `<short><shortReason>`,
    /// message `<long> <longReason> / Namespace: .., Name: .., Version: ..`.
    pub fn for_phase<E: LifecycleEntity>(
        phase: &KeptnPhase,
        event_type: EventType,
        entity: &E,
        short_reason: &str,
        long_reason: &str,
    ) -> Self {
        Self {
            object: ObjectReference::of(entity),
            event_type,
            reason: format!("{}{}", phase.short_name, short_reason),
            message: format!(
                "{} {} / Namespace: {}, Name: {}, Version: {}",
                phase.long_name,
                long_reason,
                entity.meta().namespace,
                entity.meta().name,
                entity.version()
            ),
            timestamp: Utc::now(),
        }
    }
}

pub trait EventRecorder: Send + Sync {
    fn record(&self, event: LifecycleEvent);
}

pub struct BroadcastRecorder {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl BroadcastRecorder {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Create a new subscriber
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRecorder for BroadcastRecorder {
    fn record(&self, event: LifecycleEvent) {
        match event.event_type {
            EventType::Normal => info!(
                object = %event.object.name,
                namespace = %event.object.namespace,
                reason = %event.reason,
                "{}", event.message
            ),
            EventType::Warning => warn!(
                object = %event.object.name,
                namespace = %event.object.namespace,
                reason = %event.reason,
                "{}", event.message
            ),
        }
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }
}
