// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Worker` registration view.

use crate::ids::{InstanceId, OccurrenceId, WorkerId};
use crate::status::WorkerStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerDescriptor {
    pub name: String,
    pub routing_pattern: String,
    pub max_parallel_jobs: u32,
    pub execution_timeout_seconds: Option<i64>,
    #[serde(default)]
    pub job_data_schema: Option<serde_json::Value>,
}

/// One running replica of a worker deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInstance {
    pub instance_id: InstanceId,
    pub current_jobs: u32,
    pub max_parallel_jobs: u32,
    pub last_heartbeat: DateTime<Utc>,
    pub status: WorkerStatus,
    /// Occurrence ids this instance reported as still running on its last
    /// heartbeat, used to refresh each occurrence's `last_heartbeat`.
    #[serde(default)]
    pub job_heartbeats: Vec<OccurrenceId>,
}

/// Fleet-level registration record: a `WorkerId` may have many concurrently
/// live `WorkerInstance`s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub worker_id: WorkerId,
    pub handlers: Vec<HandlerDescriptor>,
    pub version: u32,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub instances: HashMap<InstanceId, WorkerInstance>,
}

impl WorkerRecord {
    pub fn new(worker_id: WorkerId, handlers: Vec<HandlerDescriptor>, version: u32) -> Self {
        Self { worker_id, handlers, version, metadata: HashMap::new(), instances: HashMap::new() }
    }

    /// Register or refresh an instance under this worker record.
    pub fn upsert_instance(&mut self, instance: WorkerInstance) {
        self.instances.insert(instance.instance_id, instance);
    }

    pub fn mark_shutdown(&mut self, instance_id: InstanceId) {
        if let Some(instance) = self.instances.get_mut(&instance_id) {
            instance.status = WorkerStatus::Shutdown;
        }
    }

    /// Total in-flight jobs across all instances of this worker.
    pub fn total_in_flight(&self) -> u32 {
        self.instances.values().map(|i| i.current_jobs).sum()
    }

    /// Derived status: Active if any instance has a fresh heartbeat; Zombie
    /// if the newest heartbeat is older than `3 * heartbeat_interval` but
    /// the record is still present; Shutdown if every instance reported a
    /// graceful stop; otherwise Inactive.
    pub fn derived_status(&self, now: DateTime<Utc>, heartbeat_interval: chrono::Duration) -> WorkerStatus {
        if self.instances.is_empty() {
            return WorkerStatus::Inactive;
        }
        if self.instances.values().all(|i| i.status == WorkerStatus::Shutdown) {
            return WorkerStatus::Shutdown;
        }
        let freshest = self.instances.values().map(|i| i.last_heartbeat).max();
        match freshest {
            Some(t) if now - t <= heartbeat_interval => WorkerStatus::Active,
            Some(t) if now - t > heartbeat_interval * 3 => WorkerStatus::Zombie,
            Some(_) => WorkerStatus::Inactive,
            None => WorkerStatus::Inactive,
        }
    }
}

#[cfg(test)]
#[path = "worker_record_tests.rs"]
mod tests;
