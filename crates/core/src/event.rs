// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted facts driving `sched-storage`'s materialized state.
//!
//! Each variant is something that happened, not a command: the WAL records
//! these, and `apply_event` folds them into the current view. Idempotency
//! lives in how each variant is applied (assignment, not mutation; guard
//! inserts/increments with state checks), not in the event shape itself.

use crate::failure::FailureType;
use crate::ids::{InstanceId, JobId, OccurrenceId, WorkerId};
use crate::occurrence::LogEntry;
use crate::scheduled_job::{ScheduledJobConfig, ScheduledJobUpdate};
use crate::status::OccurrenceStatus;
use crate::worker_record::{HandlerDescriptor, WorkerInstance};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Event {
    JobCreated { id: JobId, config: ScheduledJobConfig, at: DateTime<Utc> },
    JobUpdated { id: JobId, update: ScheduledJobUpdate, snapshot: String, at: DateTime<Utc> },
    JobDeleted { id: JobId },
    JobActivated { id: JobId },
    JobDeactivated { id: JobId },
    OccurrenceCreated { id: OccurrenceId, job_id: JobId, job_version_snapshot: u32, at: DateTime<Utc> },
    OccurrenceStatusChanged {
        id: OccurrenceId,
        status: OccurrenceStatus,
        at: DateTime<Utc>,
        worker_id: Option<WorkerId>,
        result: Option<String>,
        exception: Option<String>,
    },
    OccurrenceLogAppended { id: OccurrenceId, entry: LogEntry },
    OccurrenceHeartbeat { id: OccurrenceId, at: DateTime<Utc> },
    FailedOccurrenceRecorded {
        job_id: JobId,
        occurrence_id: OccurrenceId,
        final_exception: String,
        retry_count_at_failure: u32,
        failure_type: FailureType,
        at: DateTime<Utc>,
    },
    WorkerRegistered {
        worker_id: WorkerId,
        handlers: Vec<HandlerDescriptor>,
        version: u32,
        instance: WorkerInstance,
    },
    WorkerHeartbeat { worker_id: WorkerId, instance: WorkerInstance },
    WorkerInstanceShutdown { worker_id: WorkerId, instance_id: InstanceId },
    JobAutoDisabled { id: JobId, at: DateTime<Utc>, snapshot: String },
    JobReEnabled { id: JobId, at: DateTime<Utc> },
    AutoDisableCountersUpdated { id: JobId, consecutive_failures: u32, at: Option<DateTime<Utc>> },
}

impl Event {
    /// Which job (if any) this event's idempotency key is scoped to, for
    /// dedup keys that span (occurrence id, target status) rather than the
    /// whole event.
    pub fn affected_job(&self) -> Option<JobId> {
        match self {
            Event::JobCreated { id, .. }
            | Event::JobUpdated { id, .. }
            | Event::JobDeleted { id }
            | Event::JobActivated { id }
            | Event::JobDeactivated { id }
            | Event::JobAutoDisabled { id, .. }
            | Event::JobReEnabled { id, .. }
            | Event::AutoDisableCountersUpdated { id, .. } => Some(*id),
            Event::OccurrenceCreated { job_id, .. } | Event::FailedOccurrenceRecorded { job_id, .. } => {
                Some(*job_id)
            }
            _ => None,
        }
    }
}

crate::simple_display! {
    Event {
        JobCreated(..) => "job_created",
        JobUpdated(..) => "job_updated",
        JobDeleted(..) => "job_deleted",
        JobActivated(..) => "job_activated",
        JobDeactivated(..) => "job_deactivated",
        OccurrenceCreated(..) => "occurrence_created",
        OccurrenceStatusChanged(..) => "occurrence_status_changed",
        OccurrenceLogAppended(..) => "occurrence_log_appended",
        OccurrenceHeartbeat(..) => "occurrence_heartbeat",
        FailedOccurrenceRecorded(..) => "failed_occurrence_recorded",
        WorkerRegistered(..) => "worker_registered",
        WorkerHeartbeat(..) => "worker_heartbeat",
        WorkerInstanceShutdown(..) => "worker_instance_shutdown",
        JobAutoDisabled(..) => "job_auto_disabled",
        JobReEnabled(..) => "job_re_enabled",
        AutoDisableCountersUpdated(..) => "auto_disable_counters_updated",
    }
}
