// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sched-storage: the write-ahead log, the materialized state it folds
//! into, and periodic zstd snapshots so cold start doesn't replay from
//! sequence zero.

pub mod snapshot;
pub mod state;
pub mod wal;

pub use sched_core::Event;
pub use snapshot::{LoadedSnapshot, SnapshotError};
pub use state::MaterializedState;
pub use wal::{Wal, WalEntry, WalError};
