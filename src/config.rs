//! Operator configuration, read from a YAML file with environment overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::reconciler::RequeuePolicy;

pub const CONFIG_ENV: &str = "LIFECYCLE_OPERATOR_CONFIG";
pub const STORE_ENV: &str = "LIFECYCLE_OPERATOR_STORE";
pub const OTLP_ENV: &str = "LIFECYCLE_OPERATOR_OTLP";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OperatorConfig {
    pub service_name: String,
    /// SQLite database holding both entity kinds.
    pub store_path: PathBuf,
    /// Only reconcile this namespace; all namespaces when unset.
    pub namespace: Option<String>,
    pub poll_interval_ms: u64,
    pub max_concurrent_reconciles: usize,
    pub otlp_enabled: bool,
    /// Used when `RUST_LOG` is not set.
    pub log_filter: String,
    pub requeue: RequeuePolicy,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            service_name: "lifecycle-operator".to_string(),
            store_path: PathBuf::from("lifecycle.db"),
            namespace: None,
            poll_interval_ms: 1000,
            max_concurrent_reconciles: 8,
            otlp_enabled: false,
            log_filter: "lifecycle_operator=info".to_string(),
            requeue: RequeuePolicy::default(),
        }
    }
}

impl OperatorConfig {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("could not read config {}", path.display()))?;
        let config = serde_yaml::from_str(&content)
            .with_context(|| format!("could not parse config {}", path.display()))?;
        Ok(config)
    }

    /// Loads the file named by `LIFECYCLE_OPERATOR_CONFIG` (if any) and applies
    /// environment overrides.
    pub async fn from_env() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::load(path).await?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(STORE_ENV) {
            self.store_path = PathBuf::from(path);
        }
        if let Some(flag) = lookup(OTLP_ENV) {
            self.otlp_enabled = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }
}
