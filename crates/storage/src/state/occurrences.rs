// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `JobOccurrence` event handlers.

use sched_core::{Event, JobOccurrence};
use tracing::warn;

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::OccurrenceCreated { id, job_id, job_version_snapshot, at } => {
            state
                .occurrences
                .entry(*id)
                .or_insert_with(|| JobOccurrence::new(*id, *job_id, *job_version_snapshot, *at));
        }

        Event::OccurrenceStatusChanged { id, status, at, worker_id, result, exception } => {
            if let Some(occurrence) = state.occurrences.get_mut(id) {
                let outcome = if status.is_terminal() {
                    occurrence.finish(*status, *at, result.clone(), exception.clone())
                } else if let Some(worker_id) = worker_id {
                    occurrence.start(*worker_id, *at)
                } else {
                    occurrence.apply_status(*status, *at)
                };
                // Illegal or stale transitions are expected on replay races
                // (e.g. a cancel racing a completion); log and move on
                // rather than letting a rejected transition halt replay.
                if let Err(violation) = outcome {
                    warn!(occurrence_id = %id, %violation, "rejected occurrence status transition");
                }
            }
        }

        Event::OccurrenceLogAppended { id, entry } => {
            if let Some(occurrence) = state.occurrences.get_mut(id) {
                occurrence.append_log(entry.clone());
            }
        }

        Event::OccurrenceHeartbeat { id, at } => {
            if let Some(occurrence) = state.occurrences.get_mut(id) {
                occurrence.heartbeat(*at);
            }
        }

        _ => {}
    }
}
