use serde::Deserialize;
use std::time::Duration;

/// Configuration for an [`ExecutionService`](super::ExecutionService).
///
/// - `SWITCHYARD_POOL_NAME`: worker thread name prefix (default: `switchyard`)
/// - `SWITCHYARD_MAX_WORKERS`: concurrent worker limit, `0` for unbounded (default: 16)
/// - `SWITCHYARD_KEEP_ALIVE_MS`: idle time before a worker retires (default: 60000)
/// - `SWITCHYARD_RETENTION_MS`: how long finished tasks stay queryable (default: one hour)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub pool_name: String,
    pub max_workers: usize,
    pub keep_alive_ms: u64,
    pub retention_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            pool_name: "switchyard".to_string(),
            max_workers: 16,
            keep_alive_ms: 60_000,
            retention_ms: 3_600_000,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

impl ExecutorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            pool_name: std::env::var("SWITCHYARD_POOL_NAME")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.pool_name),
            max_workers: env_parse("SWITCHYARD_MAX_WORKERS").unwrap_or(defaults.max_workers),
            keep_alive_ms: env_parse("SWITCHYARD_KEEP_ALIVE_MS").unwrap_or(defaults.keep_alive_ms),
            retention_ms: env_parse("SWITCHYARD_RETENTION_MS").unwrap_or(defaults.retention_ms),
        }
    }

    /// Worker limit, `None` when unbounded.
    #[must_use]
    pub fn max_workers(&self) -> Option<usize> {
        (self.max_workers > 0).then_some(self.max_workers)
    }

    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    #[must_use]
    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }

    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive_ms = u64::try_from(keep_alive.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention_ms = u64::try_from(retention.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_pool_name(mut self, name: impl Into<String>) -> Self {
        self.pool_name = name.into();
        self
    }
}
