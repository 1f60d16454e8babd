// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `WorkerRecord` event handlers.

use sched_core::{Event, WorkerRecord};

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::WorkerRegistered { worker_id, handlers, version, instance } => {
            let record = state
                .workers
                .entry(*worker_id)
                .or_insert_with(|| WorkerRecord::new(*worker_id, handlers.clone(), *version));
            record.handlers = handlers.clone();
            record.version = *version;
            record.upsert_instance(instance.clone());
        }

        Event::WorkerHeartbeat { worker_id, instance } => {
            if let Some(record) = state.workers.get_mut(worker_id) {
                for occurrence_id in &instance.job_heartbeats {
                    if let Some(occurrence) = state.occurrences.get_mut(occurrence_id) {
                        occurrence.heartbeat(instance.last_heartbeat);
                    }
                }
                record.upsert_instance(instance.clone());
            }
        }

        Event::WorkerInstanceShutdown { worker_id, instance_id } => {
            if let Some(record) = state.workers.get_mut(worker_id) {
                record.mark_shutdown(*instance_id);
            }
        }

        _ => {}
    }
}
