#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;
use switchyard::executor::ExecutorConfig;
use switchyard::logging::{LogConfig, LogFormat};
use switchyard::RuntimeConfig;

// Environment variables are process-wide
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const VARS: [&str; 6] = [
    "SWITCHYARD_STATUS_PREFIX",
    "SWITCHYARD_POOL_NAME",
    "SWITCHYARD_MAX_WORKERS",
    "SWITCHYARD_KEEP_ALIVE_MS",
    "SWITCHYARD_RETENTION_MS",
    "SWITCHYARD_LOG_FORMAT",
];

fn clear_env() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

#[test]
fn test_runtime_config_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();

    let config = RuntimeConfig::from_env();
    assert_eq!(config, RuntimeConfig::default());
    assert_eq!(config.status_prefix, "/_status/");
    assert_eq!(config.executor.max_workers(), Some(16));
    assert_eq!(config.executor.keep_alive(), Duration::from_secs(60));
    assert_eq!(config.executor.retention(), Duration::from_secs(3600));
}

#[test]
fn test_runtime_config_from_env() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    std::env::set_var("SWITCHYARD_STATUS_PREFIX", "/_tasks/");
    std::env::set_var("SWITCHYARD_POOL_NAME", "reports");
    std::env::set_var("SWITCHYARD_MAX_WORKERS", "0");
    std::env::set_var("SWITCHYARD_KEEP_ALIVE_MS", "250");
    std::env::set_var("SWITCHYARD_RETENTION_MS", "1000");

    let config = RuntimeConfig::from_env();
    clear_env();

    assert_eq!(config.status_prefix, "/_tasks/");
    assert_eq!(config.executor.pool_name, "reports");
    assert_eq!(config.executor.max_workers(), None);
    assert_eq!(config.executor.keep_alive(), Duration::from_millis(250));
    assert_eq!(config.executor.retention(), Duration::from_secs(1));
}

#[test]
fn test_invalid_env_values_fall_back_to_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    std::env::set_var("SWITCHYARD_MAX_WORKERS", "many");

    let config = ExecutorConfig::from_env();
    clear_env();
    assert_eq!(config.max_workers(), Some(16));
}

#[test]
fn test_runtime_config_from_yaml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "status_prefix: /_jobs/\nexecutor:\n  pool_name: batch\n  max_workers: 2\n  retention_ms: 5000"
    )
    .unwrap();

    let config = RuntimeConfig::from_yaml_file(file.path()).unwrap();
    assert_eq!(config.status_prefix, "/_jobs/");
    assert_eq!(config.executor.pool_name, "batch");
    assert_eq!(config.executor.max_workers(), Some(2));
    assert_eq!(config.executor.retention(), Duration::from_secs(5));
    assert_eq!(config.executor.keep_alive_ms, 60_000);
}

#[test]
fn test_missing_yaml_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.yaml");
    let err = RuntimeConfig::from_yaml_file(&path).unwrap_err();
    assert!(format!("{err:#}").contains("absent.yaml"));
}

#[test]
fn test_log_config_from_env() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    std::env::set_var("SWITCHYARD_LOG_FORMAT", "pretty");

    let config = LogConfig::from_env();
    clear_env();
    assert_eq!(config.format, LogFormat::Pretty);
    assert_eq!(config.log_level, "info");
}
