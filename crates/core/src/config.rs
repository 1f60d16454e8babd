// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration tree, loaded from TOML with environment variable
//! overrides for secrets.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse { path: PathBuf, #[source] source: toml::de::Error },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherConfig {
    pub enabled: bool,
    pub polling_interval_seconds: u64,
    pub batch_size: u32,
    pub lock_ttl_seconds: u64,
    pub enable_startup_recovery: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            polling_interval_seconds: 5,
            batch_size: 100,
            lock_ttl_seconds: 30,
            enable_startup_recovery: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub vhost: String,
    #[serde(default = "default_true")]
    pub durable: bool,
    #[serde(default)]
    pub auto_delete: bool,
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    #[serde(default = "default_broker_heartbeat_seconds")]
    pub heartbeat_seconds: u16,
    #[serde(default = "default_true")]
    pub automatic_recovery: bool,
    #[serde(default = "default_network_recovery_interval_ms")]
    pub network_recovery_interval_ms: u64,
    #[serde(default = "default_queue_depth_warning")]
    pub queue_depth_warning_threshold: u64,
    #[serde(default = "default_queue_depth_critical")]
    pub queue_depth_critical_threshold: u64,
    /// Overridden at load time by `SCHED_BROKER_URL` when set, so the
    /// connection string itself never has to live in the TOML file.
    #[serde(default)]
    pub url_override: Option<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            vhost: "/".to_string(),
            durable: true,
            auto_delete: false,
            connection_timeout_ms: default_connection_timeout_ms(),
            heartbeat_seconds: default_broker_heartbeat_seconds(),
            automatic_recovery: true,
            network_recovery_interval_ms: default_network_recovery_interval_ms(),
            queue_depth_warning_threshold: default_queue_depth_warning(),
            queue_depth_critical_threshold: default_queue_depth_critical(),
            url_override: None,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_connection_timeout_ms() -> u64 {
    10_000
}
fn default_broker_heartbeat_seconds() -> u16 {
    30
}
fn default_network_recovery_interval_ms() -> u64 {
    5_000
}
fn default_queue_depth_warning() -> u64 {
    1_000
}
fn default_queue_depth_critical() -> u64 {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvConfig {
    /// Overridden at load time by `SCHED_KV_URL` when set.
    #[serde(default)]
    pub connection_string: String,
    #[serde(default)]
    pub database: u8,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_connection_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_connection_timeout_ms")]
    pub sync_timeout_ms: u64,
    #[serde(default = "default_lock_ttl_seconds")]
    pub default_lock_ttl_seconds: u64,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            database: 0,
            key_prefix: default_key_prefix(),
            connect_timeout_ms: default_connection_timeout_ms(),
            sync_timeout_ms: default_connection_timeout_ms(),
            default_lock_ttl_seconds: default_lock_ttl_seconds(),
        }
    }
}

fn default_key_prefix() -> String {
    "sched:".to_string()
}
fn default_lock_ttl_seconds() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoDisableConfig {
    pub enabled: bool,
    pub consecutive_failure_threshold: u32,
    pub failure_window_minutes: u32,
}

impl Default for AutoDisableConfig {
    fn default() -> Self {
        Self { enabled: true, consecutive_failure_threshold: 5, failure_window_minutes: 60 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatConfig {
    pub interval_seconds: u64,
    pub job_heartbeat_interval_seconds: u64,
    pub enabled: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { interval_seconds: 10, job_heartbeat_interval_seconds: 15, enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineResilienceConfig {
    pub enabled: bool,
    pub local_storage_path: PathBuf,
    pub sync_interval_seconds: u64,
    pub max_sync_retries: u32,
    pub cleanup_interval_hours: u64,
    pub record_retention_days: u32,
}

impl Default for OfflineResilienceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            local_storage_path: PathBuf::from("./sched-worker-outbox.sqlite3"),
            sync_interval_seconds: 5,
            max_sync_retries: 5,
            cleanup_interval_hours: 6,
            record_retention_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerConfig {
    pub worker_id: String,
    pub max_parallel_jobs: u32,
    /// Zero/negative disables the timeout (discouraged); negative rejected
    /// at load time, not merely discouraged.
    pub execution_timeout_seconds: i64,
    pub heartbeat: HeartbeatConfig,
    pub offline_resilience: OfflineResilienceConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: String::new(),
            max_parallel_jobs: 10,
            execution_timeout_seconds: 3600,
            heartbeat: HeartbeatConfig::default(),
            offline_resilience: OfflineResilienceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerConsumerConfig {
    pub consumer_id: String,
    pub routing_pattern: String,
    pub max_parallel_jobs: u32,
    pub execution_timeout_seconds: i64,
    pub max_retries: u32,
    pub base_retry_delay_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub kv: KvConfig,
    #[serde(default)]
    pub auto_disable: AutoDisableConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub handlers: Vec<HandlerConsumerConfig>,
}

// manual Default impls above opt out of #[derive(Default)] per-field
// defaults, since several carry computed values (paths, prefixes); Config
// itself can still derive Default because every field type has one.

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let mut config: Config = toml::from_str(&text)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// `SCHED_BROKER_URL` / `SCHED_KV_URL` / `SCHED_WORKER_ID` override
    /// whatever the TOML file set, following the convention of keeping
    /// connection secrets out of checked-in configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("SCHED_BROKER_URL") {
            self.broker.url_override = Some(url);
        }
        if let Ok(url) = std::env::var("SCHED_KV_URL") {
            self.kv.connection_string = url;
        }
        if let Ok(worker_id) = std::env::var("SCHED_WORKER_ID") {
            self.worker.worker_id = worker_id;
        }
    }

    /// Rejects configuration invalid at load time: negative
    /// timeouts and anything else the boundary-behaviour tests pin down.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.execution_timeout_seconds < 0 {
            return Err(ConfigError::Invalid(
                "worker.executionTimeoutSeconds must not be negative".to_string(),
            ));
        }
        for handler in &self.handlers {
            if handler.execution_timeout_seconds < 0 {
                return Err(ConfigError::Invalid(format!(
                    "handler {:?} executionTimeoutSeconds must not be negative",
                    handler.consumer_id
                )));
            }
        }
        if self.dispatcher.batch_size == 0 {
            return Err(ConfigError::Invalid("dispatcher.batchSize must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
