// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `JobOccurrence` entity and its append-only log.

use crate::ids::{JobId, OccurrenceId, WorkerId};
use crate::status::OccurrenceStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// One entry in an occurrence's append-only log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_type: Option<String>,
}

/// A recorded status change, for the occurrence's status-change history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: OccurrenceStatus,
    pub at: DateTime<Utc>,
}

/// One attempted execution of a scheduled job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOccurrence {
    pub id: OccurrenceId,
    pub job_id: JobId,
    pub worker_id: Option<WorkerId>,
    pub status: OccurrenceStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub exception: Option<String>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// `ScheduledJob::version` at the moment this occurrence was dispatched.
    pub job_version_snapshot: u32,
    pub zombie_timeout_minutes: Option<u32>,
    /// Which retry attempt this occurrence represents, zero-based.
    #[serde(default)]
    pub retry_attempt: u32,
}

impl JobOccurrence {
    pub fn new(id: OccurrenceId, job_id: JobId, job_version_snapshot: u32, now: DateTime<Utc>) -> Self {
        Self {
            id,
            job_id,
            worker_id: None,
            status: OccurrenceStatus::Queued,
            start_time: None,
            end_time: None,
            result: None,
            exception: None,
            logs: Vec::new(),
            status_history: vec![StatusChange { status: OccurrenceStatus::Queued, at: now }],
            last_heartbeat: None,
            job_version_snapshot,
            zombie_timeout_minutes: None,
            retry_attempt: 0,
        }
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }

    /// Apply a status transition idempotently: accepted silently if it's a
    /// repeat of the current status, rejected (logged, not propagated) if
    /// illegal, applied otherwise. Once terminal, later transitions are
    /// rejected outright (the DLQ projection handles resolution metadata
    /// separately, not through this path).
    pub fn apply_status(&mut self, next: OccurrenceStatus, at: DateTime<Utc>) -> Result<(), StateViolation> {
        if self.status == next {
            return Ok(());
        }
        if self.status.is_terminal() {
            return Err(StateViolation { from: self.status, to: next });
        }
        if !self.status.can_transition_to(next) {
            return Err(StateViolation { from: self.status, to: next });
        }
        self.status = next;
        self.status_history.push(StatusChange { status: next, at });
        Ok(())
    }

    pub fn start(&mut self, worker_id: WorkerId, at: DateTime<Utc>) -> Result<(), StateViolation> {
        self.apply_status(OccurrenceStatus::Running, at)?;
        self.worker_id = Some(worker_id);
        self.start_time.get_or_insert(at);
        Ok(())
    }

    /// Finalize a terminal status, computing duration when a start time is
    /// present. Idempotent: calling this twice with the same status leaves
    /// the record unchanged.
    pub fn finish(
        &mut self,
        status: OccurrenceStatus,
        at: DateTime<Utc>,
        result: Option<String>,
        exception: Option<String>,
    ) -> Result<(), StateViolation> {
        let already_terminal = self.status == status && self.status.is_terminal();
        self.apply_status(status, at)?;
        if !already_terminal {
            self.end_time.get_or_insert(at);
            if result.is_some() {
                self.result = result;
            }
            if exception.is_some() {
                self.exception = exception;
            }
        }
        Ok(())
    }

    pub fn append_log(&mut self, entry: LogEntry) {
        self.logs.push(entry);
    }

    pub fn heartbeat(&mut self, at: DateTime<Utc>) {
        self.last_heartbeat = Some(at);
    }
}

/// An attempted illegal status transition: rejected and logged by the
/// caller, never propagated to user code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal occurrence transition {from} -> {to}")]
pub struct StateViolation {
    pub from: OccurrenceStatus,
    pub to: OccurrenceStatus,
}

crate::builder! {
    pub struct JobOccurrenceBuilder => JobOccurrence {
        set {
            id: OccurrenceId = OccurrenceId::new(),
            job_id: JobId = JobId::new(),
            worker_id: Option<WorkerId> = None,
            status: OccurrenceStatus = OccurrenceStatus::Queued,
            start_time: Option<DateTime<Utc>> = None,
            end_time: Option<DateTime<Utc>> = None,
            result: Option<String> = None,
            exception: Option<String> = None,
            logs: Vec<LogEntry> = Vec::new(),
            status_history: Vec<StatusChange> = Vec::new(),
            last_heartbeat: Option<DateTime<Utc>> = None,
            job_version_snapshot: u32 = 1,
            zombie_timeout_minutes: Option<u32> = None,
            retry_attempt: u32 = 0,
        }
    }
}

#[cfg(test)]
#[path = "occurrence_tests.rs"]
mod tests;
