// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `FailedOccurrence` dead-letter projection.

use crate::failure::FailureType;
use crate::ids::{JobId, OccurrenceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedOccurrence {
    pub job_id: JobId,
    pub occurrence_id: OccurrenceId,
    pub final_exception: String,
    pub retry_count_at_failure: u32,
    pub failure_type: FailureType,
    pub recorded_at: DateTime<Utc>,
    pub resolved: bool,
    #[serde(default)]
    pub resolution_note: Option<String>,
}

impl FailedOccurrence {
    pub fn new(
        job_id: JobId,
        occurrence_id: OccurrenceId,
        final_exception: impl Into<String>,
        retry_count_at_failure: u32,
        failure_type: FailureType,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id,
            occurrence_id,
            final_exception: final_exception.into(),
            retry_count_at_failure,
            failure_type,
            recorded_at,
            resolved: false,
            resolution_note: None,
        }
    }

    pub fn resolve(&mut self, note: impl Into<String>) {
        self.resolved = true;
        self.resolution_note = Some(note.into());
    }
}

crate::builder! {
    pub struct FailedOccurrenceBuilder => FailedOccurrence {
        set {
            job_id: JobId = JobId::new(),
            occurrence_id: OccurrenceId = OccurrenceId::new(),
            final_exception: String = String::from("boom"),
            retry_count_at_failure: u32 = 0,
            failure_type: FailureType = FailureType::Unknown,
            recorded_at: DateTime<Utc> = Utc::now(),
            resolved: bool = false,
            resolution_note: Option<String> = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolving_sets_the_flag_and_note() {
        let mut failed = FailedOccurrence::new(
            JobId::new(),
            OccurrenceId::new(),
            "connection refused",
            3,
            FailureType::MaxRetriesExceeded,
            Utc::now(),
        );
        assert!(!failed.resolved);
        failed.resolve("operator acknowledged");
        assert!(failed.resolved);
        assert_eq!(failed.resolution_note.as_deref(), Some("operator acknowledged"));
    }
}
