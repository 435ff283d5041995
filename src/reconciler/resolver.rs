//! Finds the application version a workload instance belongs to.

use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

use crate::lifecycle::{version, ApplicationVersion, WorkloadInstance};
use crate::store::{Store, StoreError};

pub struct AppVersionResolver {
    apps: Arc<dyn Store<ApplicationVersion>>,
}

impl AppVersionResolver {
    pub fn new(apps: Arc<dyn Store<ApplicationVersion>>) -> Self {
        Self { apps }
    }

    /// Newest application version in the instance's namespace that declares
    /// this workload at this version. Ties keep the first listed candidate.
    pub async fn resolve(&self, instance: &WorkloadInstance) -> Result<Option<ApplicationVersion>, StoreError> {
        let candidates = self.apps.list(Some(&instance.metadata.namespace)).await?;

        let mut latest: Option<ApplicationVersion> = None;
        for app in candidates {
            if app.spec.app_name != instance.spec.app_name
                || !app.declares_workload(&instance.spec.workload_name, &instance.spec.version)
            {
                continue;
            }
            let newer = match &latest {
                None => true,
                Some(best) => version::compare(&app.spec.version, &best.spec.version) == Ordering::Greater,
            };
            if newer {
                latest = Some(app);
            }
        }

        debug!(
            workload = %instance.spec.workload_name,
            version = %instance.spec.version,
            app_version = latest.as_ref().map(|a| a.spec.version.as_str()).unwrap_or("none"),
            "resolved owning app version"
        );
        Ok(latest)
    }
}
