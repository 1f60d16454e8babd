// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Envelope shapes carried over the broker, bit-exact across scheduler and
//! worker.

use chrono::{DateTime, Utc};
use sched_core::{HandlerDescriptor, InstanceId, JobId, LogEntry, OccurrenceId, OccurrenceStatus, WorkerId, WorkerStatus};
use serde::{Deserialize, Serialize};

/// What the dispatcher publishes to `jobs.topic`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMessageEnvelope {
    pub job_id: JobId,
    pub correlation_id: OccurrenceId,
    pub job_name: String,
    pub job_data: String,
    pub job_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_timeout_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zombie_timeout_minutes: Option<u32>,
    pub published_at: DateTime<Utc>,
}

/// What a worker publishes to `job_status_updates_queue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateEnvelope {
    pub correlation_id: OccurrenceId,
    pub job_id: JobId,
    pub worker_id: WorkerId,
    pub status: OccurrenceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    pub message_timestamp: DateTime<Utc>,
}

impl StatusUpdateEnvelope {
    /// Computed from `start_time`/`end_time` on construction rather than
    /// trusted from the wire: a worker always sends both timestamps, but
    /// the scheduler does not depend on the worker having done the
    /// arithmetic correctly.
    pub fn computed_duration_ms(&self) -> Option<i64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

/// The log payload nested inside [`LogEnvelope`].
pub type LogPayload = LogEntry;

/// What a worker publishes to `worker_logs_queue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEnvelope {
    pub correlation_id: OccurrenceId,
    pub worker_id: WorkerId,
    pub log: LogPayload,
    pub message_timestamp: DateTime<Utc>,
}

/// What a worker publishes to `worker_registration_queue` on startup.
/// Reuses [`HandlerDescriptor`] verbatim since its fields already match the
/// envelope's `handlers[]` shape one-to-one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationEnvelope {
    pub worker_id: WorkerId,
    pub instance_id: InstanceId,
    pub handlers: Vec<HandlerDescriptor>,
    pub version: u32,
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
}

/// One occurrence this worker instance still considers running, carried in
/// [`HeartbeatEnvelope::jobs`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHeartbeat {
    pub correlation_id: OccurrenceId,
    pub last_heartbeat: DateTime<Utc>,
}

/// What a worker publishes to `worker_heartbeat_queue` every `H` seconds
///.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatEnvelope {
    pub worker_id: WorkerId,
    pub instance_id: InstanceId,
    pub current_jobs: u32,
    pub max_parallel_jobs: u32,
    pub status: WorkerStatus,
    pub jobs: Vec<JobHeartbeat>,
}

#[cfg(test)]
#[path = "envelopes_tests.rs"]
mod tests;
