// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Occurrence and worker status enums, plus the occurrence state machine.

use serde::{Deserialize, Serialize};

/// Status of a single job occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OccurrenceStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
    Unknown,
}

crate::simple_display! {
    OccurrenceStatus {
        Queued => "queued",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
        TimedOut => "timed_out",
        Unknown => "unknown",
    }
}

impl OccurrenceStatus {
    /// Terminal statuses may not be mutated further except resolution metadata
    /// on the DLQ projection.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::TimedOut | Self::Unknown
        )
    }

    /// Whether `self -> next` is a legal transition: Queued -> {Running,
    /// Cancelled, Failed}; Running -> {Completed, Failed, Cancelled,
    /// TimedOut, Unknown}. Terminal statuses have no outgoing transitions,
    /// but applying the same terminal status again is idempotent (accepted,
    /// a no-op) rather than illegal.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        use OccurrenceStatus::*;
        match self {
            Queued => matches!(next, Running | Cancelled | Failed),
            Running => matches!(next, Completed | Failed | Cancelled | TimedOut | Unknown),
            Completed | Failed | Cancelled | TimedOut | Unknown => false,
        }
    }
}

/// Derived status of a registered worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkerStatus {
    Active,
    Inactive,
    Zombie,
    Shutdown,
}

crate::simple_display! {
    WorkerStatus {
        Active => "active",
        Inactive => "inactive",
        Zombie => "zombie",
        Shutdown => "shutdown",
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
