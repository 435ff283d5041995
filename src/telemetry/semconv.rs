//! Attribute keys and attribute sets derived from entity identity.

use opentelemetry::KeyValue;

use crate::lifecycle::LifecycleEntity;

pub const APP_NAME: &str = "keptn.deployment.app.name";
pub const APP_VERSION: &str = "keptn.deployment.app.version";
pub const APP_NAMESPACE: &str = "keptn.deployment.app.namespace";
pub const APP_STATUS: &str = "keptn.deployment.app.status";
pub const APP_PREVIOUS_VERSION: &str = "keptn.deployment.app.previousversion";
pub const WORKLOAD_NAME: &str = "keptn.deployment.workload.name";
pub const WORKLOAD_VERSION: &str = "keptn.deployment.workload.version";
pub const WORKLOAD_NAMESPACE: &str = "keptn.deployment.workload.namespace";
pub const WORKLOAD_STATUS: &str = "keptn.deployment.workload.status";
pub const WORKLOAD_PREVIOUS_VERSION: &str = "keptn.deployment.workload.previousversion";

/// Identity attributes attached to spans.
pub fn identity_attributes<E: LifecycleEntity>(entity: &E) -> Vec<KeyValue> {
    let namespace = entity.meta().namespace.clone();
    match entity.workload_name() {
        None => vec![
            KeyValue::new(APP_NAME, entity.app_name().to_string()),
            KeyValue::new(APP_VERSION, entity.version().to_string()),
            KeyValue::new(APP_NAMESPACE, namespace),
        ],
        Some(workload) => vec![
            KeyValue::new(APP_NAME, entity.app_name().to_string()),
            KeyValue::new(WORKLOAD_NAME, workload.to_string()),
            KeyValue::new(WORKLOAD_VERSION, entity.version().to_string()),
            KeyValue::new(WORKLOAD_NAMESPACE, namespace),
        ],
    }
}

/// Attributes for the count and duration instruments.
pub fn metrics_attributes<E: LifecycleEntity>(entity: &E) -> Vec<KeyValue> {
    let mut attrs = identity_attributes(entity);
    let key = if entity.workload_name().is_some() { WORKLOAD_STATUS } else { APP_STATUS };
    attrs.push(KeyValue::new(key, entity.lifecycle().status.to_string()));
    attrs
}

/// Attributes for the active gauge; status is left out so the series stays stable.
pub fn active_attributes<E: LifecycleEntity>(entity: &E) -> Vec<KeyValue> {
    identity_attributes(entity)
}

/// Attributes for duration and interval gauges, linking the previous version.
pub fn duration_attributes<E: LifecycleEntity>(entity: &E) -> Vec<KeyValue> {
    let mut attrs = identity_attributes(entity);
    let key = if entity.workload_name().is_some() {
        WORKLOAD_PREVIOUS_VERSION
    } else {
        APP_PREVIOUS_VERSION
    };
    attrs.push(KeyValue::new(key, entity.previous_version().unwrap_or_default().to_string()));
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{ApplicationVersion, WorkloadInstance};

    #[test]
    fn test_workload_attributes_carry_workload_keys() {
        let wi = WorkloadInstance::new("demo", "app", "workload1", "1.0.0");
        let attrs = metrics_attributes(&wi);
        assert!(attrs.contains(&KeyValue::new(WORKLOAD_NAME, "app-workload1")));
        assert!(attrs.contains(&KeyValue::new(WORKLOAD_STATUS, "Pending")));
        assert!(!attrs.iter().any(|kv| kv.key.as_str() == APP_VERSION));
    }

    #[test]
    fn test_app_duration_attributes_link_previous_version() {
        let mut app = ApplicationVersion::new("demo", "podtato", "1.1.0", vec![]);
        app.spec.previous_version = Some("1.0.0".into());
        let attrs = duration_attributes(&app);
        assert!(attrs.contains(&KeyValue::new(APP_PREVIOUS_VERSION, "1.0.0")));
        assert_eq!(active_attributes(&app).len(), 3);
    }
}
