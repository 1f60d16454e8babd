// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state folded from replayed [`Event`]s.

mod failed_occurrences;
mod jobs;
mod occurrences;
mod workers;

use sched_core::{Event, FailedOccurrence, JobId, JobOccurrence, OccurrenceId, ScheduledJob, WorkerId, WorkerRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Everything the scheduler knows, derived entirely from the WAL.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub jobs: HashMap<JobId, ScheduledJob>,
    pub occurrences: HashMap<OccurrenceId, JobOccurrence>,
    pub failed_occurrences: HashMap<OccurrenceId, FailedOccurrence>,
    pub workers: HashMap<WorkerId, WorkerRecord>,
}

impl MaterializedState {
    pub fn get_job(&self, id: &JobId) -> Option<&ScheduledJob> {
        self.jobs.get(id)
    }

    pub fn get_occurrence(&self, id: &OccurrenceId) -> Option<&JobOccurrence> {
        self.occurrences.get(id)
    }

    /// Non-terminal occurrences for a job, for Skip-policy enforcement: at
    /// most one non-terminal occurrence per Skip-policy job.
    pub fn non_terminal_occurrences_for(&self, job_id: &JobId) -> Vec<&JobOccurrence> {
        self.occurrences
            .values()
            .filter(|o| &o.job_id == job_id && !o.status.is_terminal())
            .collect()
    }

    /// Apply an event to derive state changes.
    ///
    /// # Idempotency requirement
    ///
    /// All handlers MUST be idempotent: applying the same event twice must
    /// produce the same state as applying it once, since a crash between
    /// "event applied" and "WAL entry marked processed" means replay may
    /// re-deliver it. Use assignment instead of mutation, guard inserts and
    /// increments with state checks, and let status transitions go through
    /// `JobOccurrence::apply_status`/`finish`, which are idempotent by
    /// construction.
    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::JobCreated { .. }
            | Event::JobUpdated { .. }
            | Event::JobDeleted { .. }
            | Event::JobActivated { .. }
            | Event::JobDeactivated { .. }
            | Event::JobAutoDisabled { .. }
            | Event::JobReEnabled { .. }
            | Event::AutoDisableCountersUpdated { .. } => jobs::apply(self, event),

            Event::OccurrenceCreated { .. }
            | Event::OccurrenceStatusChanged { .. }
            | Event::OccurrenceLogAppended { .. }
            | Event::OccurrenceHeartbeat { .. } => occurrences::apply(self, event),

            Event::FailedOccurrenceRecorded { .. } => failed_occurrences::apply(self, event),

            Event::WorkerRegistered { .. }
            | Event::WorkerHeartbeat { .. }
            | Event::WorkerInstanceShutdown { .. } => workers::apply(self, event),
        }
    }
}

#[cfg(test)]
#[path = "../state_tests.rs"]
mod tests;
