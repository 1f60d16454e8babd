// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Failure classification for terminal occurrences.

use serde::{Deserialize, Serialize};

/// Why an occurrence ended up in the dead-letter projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureType {
    Unknown,
    MaxRetriesExceeded,
    Timeout,
    WorkerCrash,
    InvalidJobData,
    ExternalDependencyFailure,
    UnhandledException,
    Cancelled,
    ZombieDetection,
}

crate::simple_display! {
    FailureType {
        Unknown => "unknown",
        MaxRetriesExceeded => "max_retries_exceeded",
        Timeout => "timeout",
        WorkerCrash => "worker_crash",
        InvalidJobData => "invalid_job_data",
        ExternalDependencyFailure => "external_dependency_failure",
        UnhandledException => "unhandled_exception",
        Cancelled => "cancelled",
        ZombieDetection => "zombie_detection",
    }
}

/// Marker prefix a worker sets on `exception` to signal that a `Failed`
/// outcome is permanent, without adding a field to the bit-exact
/// [`sched_wire::StatusUpdateEnvelope`]. Scheduler-side code should always
/// go through [`is_permanent_exception`] rather than matching the prefix
/// directly.
pub const PERMANENT_EXCEPTION_MARKER: &str = "[permanent] ";

/// Tag an exception message as permanent for transmission in a
/// `StatusUpdateEnvelope.exception` field.
pub fn mark_permanent_exception(message: impl AsRef<str>) -> String {
    format!("{PERMANENT_EXCEPTION_MARKER}{}", message.as_ref())
}

/// Whether a received exception message was tagged permanent by the worker.
pub fn is_permanent_exception(exception: &str) -> bool {
    exception.starts_with(PERMANENT_EXCEPTION_MARKER)
}

/// Outcome of a handler invocation: a tagged result rather than
/// exception-driven control, so a handler doesn't throw to signal
/// permanence, it sets a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed { result: Option<String> },
    Failed { message: String, permanent: bool },
    TimedOut,
    Cancelled,
}

impl Outcome {
    /// Classify a failed/timed-out/cancelled outcome into a [`FailureType`],
    /// given how many attempts have already been made and the configured
    /// maximum. `Completed` has no failure type and is not a valid input.
    ///
    /// A permanent failure is `InvalidJobData` only when its message carries
    /// the `invalid job data: ` prefix a worker adds for a deserialization
    /// failure (see [`is_invalid_job_data`]); any other permanent failure
    /// (a handler rejecting the job outright) is `UnhandledException`.
    pub fn classify(&self, attempt: u32, max_attempts: u32) -> Option<FailureType> {
        match self {
            Outcome::Completed { .. } => None,
            Outcome::TimedOut => Some(FailureType::Timeout),
            Outcome::Cancelled => Some(FailureType::Cancelled),
            Outcome::Failed { message, permanent } if *permanent => {
                if is_invalid_job_data(message) {
                    Some(FailureType::InvalidJobData)
                } else {
                    Some(FailureType::UnhandledException)
                }
            }
            Outcome::Failed { .. } if attempt >= max_attempts => {
                Some(FailureType::MaxRetriesExceeded)
            }
            Outcome::Failed { .. } => Some(FailureType::UnhandledException),
        }
    }
}

/// Whether an exception message (permanent-marked or not) reports a
/// deserialization failure rather than some other business-rule rejection.
pub fn is_invalid_job_data(exception: &str) -> bool {
    let unmarked = exception.strip_prefix(PERMANENT_EXCEPTION_MARKER).unwrap_or(exception);
    unmarked.starts_with("invalid job data: ")
}

#[cfg(test)]
#[path = "failure_tests.rs"]
mod tests;
