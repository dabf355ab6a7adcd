//! # Runtime Configuration Module
//!
//! Environment-first configuration of the dispatch core, with an optional
//! YAML file for deployments that prefer one.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `SWITCHYARD_STATUS_PREFIX` | `/_status/` | Path prefix of task status polls |
//! | `SWITCHYARD_POOL_NAME` | `switchyard` | Worker thread name prefix |
//! | `SWITCHYARD_MAX_WORKERS` | `16` | Concurrent workers, `0` for unbounded |
//! | `SWITCHYARD_KEEP_ALIVE_MS` | `60000` | Idle time before a worker retires |
//! | `SWITCHYARD_RETENTION_MS` | `3600000` | How long finished tasks stay queryable |
//!
//! ## YAML
//!
//! ```yaml
//! status_prefix: /_jobs/
//! executor:
//!   max_workers: 4
//!   retention_ms: 600000
//! ```
//!
//! Missing keys keep their defaults.

use crate::bridge::DEFAULT_STATUS_PREFIX;
use crate::executor::ExecutorConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::Path;

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Path prefix of task status polls
    pub status_prefix: String,
    /// Execution service settings
    pub executor: ExecutorConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            status_prefix: DEFAULT_STATUS_PREFIX.to_string(),
            executor: ExecutorConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let status_prefix = env::var("SWITCHYARD_STATUS_PREFIX")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_STATUS_PREFIX.to_string());
        RuntimeConfig {
            status_prefix,
            executor: ExecutorConfig::from_env(),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("invalid runtime configuration")
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read runtime configuration {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_overrides_and_defaults() {
        let config = RuntimeConfig::from_yaml_str(
            "status_prefix: /_jobs/\nexecutor:\n  max_workers: 4\n",
        )
        .unwrap();
        assert_eq!(config.status_prefix, "/_jobs/");
        assert_eq!(config.executor.max_workers, 4);
        assert_eq!(config.executor.keep_alive_ms, 60_000);
    }

    #[test]
    fn test_invalid_yaml_reports_context() {
        let err = RuntimeConfig::from_yaml_str("executor: [1, 2]").unwrap_err();
        assert!(err.to_string().contains("invalid runtime configuration"));
    }
}
