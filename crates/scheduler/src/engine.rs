// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scheduler's single write path: append to the WAL, then fold into the
//! materialized view, under one lock. Every scheduler subsystem (dispatcher,
//! lifecycle, retry, zombie, auto-disable, registry) goes through
//! [`SchedulerEngine::apply`] rather than touching the WAL or state directly,
//! so the two never drift ("persisted").

use parking_lot::Mutex;
use sched_core::Event;
use sched_storage::{MaterializedState, Wal, WalError};

pub struct SchedulerEngine {
    wal: Mutex<Wal>,
    state: Mutex<MaterializedState>,
}

impl SchedulerEngine {
    pub fn new(wal: Wal, state: MaterializedState) -> Self {
        Self { wal: Mutex::new(wal), state: Mutex::new(state) }
    }

    /// Append `event` to the WAL and fold it into the materialized state.
    /// Flushes the WAL eagerly so readers of `state` never observe an event
    /// the WAL doesn't yet durably have (cheap insurance is out of scope to
    /// justify here; this ordering is the actual correctness requirement).
    pub fn apply(&self, event: Event) -> Result<(), WalError> {
        {
            let mut wal = self.wal.lock();
            let seq = wal.append(&event)?;
            wal.flush()?;
            wal.mark_processed(seq);
        }
        self.state.lock().apply_event(&event);
        Ok(())
    }

    /// Read access to the materialized view. Callers hold the guard only
    /// long enough to extract what they need; the dispatcher tick, in
    /// particular, must not hold this across a broker/KV await point.
    pub fn state(&self) -> parking_lot::MappedMutexGuard<'_, MaterializedState> {
        parking_lot::MutexGuard::map(self.state.lock(), |s| s)
    }

    pub fn snapshot_state(&self) -> MaterializedState {
        self.state.lock().clone()
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
