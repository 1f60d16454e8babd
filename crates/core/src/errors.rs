// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The shared error-kind taxonomy.
//!
//! Individual crates still define their own `thiserror` enums for their own
//! fallible operations (`DispatchError`, `LifecycleError`, `OutboxError`,
//! ...); this is the classification every one of those enums maps onto for
//! propagation-policy decisions (retry with breaker, surface immediately,
//! reject-and-log, DLQ).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Bad configuration, caught at load time.
    Configuration,
    /// Broker/KV/network error. Retried behind the circuit breaker.
    Transient,
    /// Invalid payload or business-rule violation. Surfaced immediately.
    Permanent,
    Timeout,
    Cancelled,
    /// Illegal state transition. Rejected and logged, never propagated.
    StateViolation,
    /// A message that cannot be parsed. Immediately dead-lettered.
    Poisoned,
}

impl ErrorKind {
    /// Transient errors are the only kind a circuit breaker should count
    /// against its failure window.
    pub fn counts_against_breaker(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }

    /// Whether this error should abort only the current unit of work
    /// (dispatcher job, handler invocation) rather than the whole loop.
    pub fn is_locally_scoped(self) -> bool {
        !matches!(self, ErrorKind::Configuration)
    }
}

crate::simple_display! {
    ErrorKind {
        Configuration => "configuration",
        Transient => "transient",
        Permanent => "permanent",
        Timeout => "timeout",
        Cancelled => "cancelled",
        StateViolation => "state_violation",
        Poisoned => "poisoned",
    }
}
