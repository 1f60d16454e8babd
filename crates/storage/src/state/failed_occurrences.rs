// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `FailedOccurrence` event handlers.

use sched_core::{Event, FailedOccurrence};

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    if let Event::FailedOccurrenceRecorded {
        job_id,
        occurrence_id,
        final_exception,
        retry_count_at_failure,
        failure_type,
        at,
    } = event
    {
        // At most one dead-letter row per occurrence: a replayed record for
        // an occurrence that already has one is a no-op.
        state.failed_occurrences.entry(*occurrence_id).or_insert_with(|| {
            FailedOccurrence::new(
                *job_id,
                *occurrence_id,
                final_exception.clone(),
                *retry_count_at_failure,
                *failure_type,
                *at,
            )
        });
    }
}
