// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concurrent-execution policy for scheduled jobs.

use serde::{Deserialize, Serialize};

/// Whether a new occurrence is suppressed or enqueued while another
/// non-terminal occurrence of the same job already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ConcurrencyPolicy {
    /// If a non-terminal occurrence exists, log and skip; still advance the
    /// cron schedule.
    #[default]
    Skip,
    /// Always create a new occurrence regardless of in-flight work.
    Queue,
}

crate::simple_display! {
    ConcurrencyPolicy {
        Skip => "skip",
        Queue => "queue",
    }
}
