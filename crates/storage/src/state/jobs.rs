// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ScheduledJob` event handlers.

use sched_core::{Event, ScheduledJob, ScheduledJobSnapshot};

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::JobCreated { id, config, .. } => {
            // Idempotent: a replayed create for an id that already exists
            // is a no-op rather than resetting the job's version history.
            state.jobs.entry(*id).or_insert_with(|| ScheduledJob::new(*id, config.clone()));
        }

        Event::JobUpdated { id, update, snapshot, .. } => {
            if let Some(job) = state.jobs.get_mut(id) {
                job.apply_update(update.clone(), || snapshot.clone());
            }
        }

        Event::JobDeleted { id } => {
            state.jobs.remove(id);
            state.occurrences.retain(|_, occ| &occ.job_id != id);
        }

        Event::JobActivated { id } => {
            if let Some(job) = state.jobs.get_mut(id) {
                job.active = true;
            }
        }

        Event::JobDeactivated { id } => {
            if let Some(job) = state.jobs.get_mut(id) {
                job.active = false;
            }
        }

        Event::JobAutoDisabled { id, snapshot, .. } => {
            if let Some(job) = state.jobs.get_mut(id) {
                job.history.push(ScheduledJobSnapshot { version: job.version, snapshot: snapshot.clone() });
                job.version += 1;
                job.active = false;
            }
        }

        Event::JobReEnabled { id, .. } => {
            if let Some(job) = state.jobs.get_mut(id) {
                job.active = true;
                job.auto_disable.consecutive_failures = 0;
            }
        }

        Event::AutoDisableCountersUpdated { id, consecutive_failures, at } => {
            if let Some(job) = state.jobs.get_mut(id) {
                // Assignment, not increment: this event already carries the
                // post-update count, so re-applying it twice is a no-op.
                job.auto_disable.consecutive_failures = *consecutive_failures;
                if at.is_some() {
                    job.auto_disable.last_failure_time = *at;
                }
            }
        }

        _ => {}
    }
}
