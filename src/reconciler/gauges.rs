//! Gauge queries over the store: how many rollouts are running, how long
//! finished ones took, and the gap to the previous version.

use tracing::warn;

use crate::lifecycle::{EntityKind, LifecycleEntity, ObjectKey};
use crate::store::{Store, StoreError};
use crate::telemetry::{semconv, GaugeFloatValue, GaugeValue};

/// One observation per entity: 1 while it has not finished, 0 afterwards.
pub async fn active_gauges<E: LifecycleEntity>(store: &dyn Store<E>) -> Result<Vec<GaugeValue>, StoreError> {
    let entities = store.list(None).await?;
    Ok(entities
        .iter()
        .map(|entity| GaugeValue {
            value: if entity.lifecycle().is_end_time_set() { 0 } else { 1 },
            attributes: semconv::active_attributes(entity),
        })
        .collect())
}

/// Seconds from start to end of every finished entity.
pub async fn duration_gauges<E: LifecycleEntity>(store: &dyn Store<E>) -> Result<Vec<GaugeFloatValue>, StoreError> {
    let entities = store.list(None).await?;
    Ok(entities
        .iter()
        .filter_map(|entity| {
            entity.lifecycle().duration_secs().map(|value| GaugeFloatValue {
                value,
                attributes: semconv::duration_attributes(entity),
            })
        })
        .collect())
}

/// Seconds between the previous version's end and this version's start.
///
/// A previous version that cannot be loaded is logged and skipped. Workload
/// instances only report once they have finished themselves.
pub async fn interval_gauges<E: LifecycleEntity>(store: &dyn Store<E>) -> Result<Vec<GaugeFloatValue>, StoreError> {
    let entities = store.list(None).await?;
    let mut values = Vec::new();

    for entity in &entities {
        let Some(previous_name) = entity.previous_version_name() else {
            continue;
        };
        if E::KIND == EntityKind::WorkloadInstance && !entity.lifecycle().is_end_time_set() {
            continue;
        }
        let Some(start) = entity.lifecycle().start_time else {
            continue;
        };

        let key = ObjectKey::new(&entity.meta().namespace, previous_name);
        let previous = match store.get(&key).await {
            Ok(previous) => previous,
            Err(err) => {
                warn!(previous = %key, error = %err, "could not find previous version");
                continue;
            }
        };
        let Some(previous_end) = previous.lifecycle().end_time else {
            continue;
        };

        values.push(GaugeFloatValue {
            value: (start - previous_end).num_milliseconds() as f64 / 1000.0,
            attributes: semconv::duration_attributes(entity),
        });
    }
    Ok(values)
}
