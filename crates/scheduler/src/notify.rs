// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pluggable event sink for occurrence and auto-disable notifications.
//! Delivery to an actual dashboard/notification channel is out of scope —
//! the default implementation just logs.

use sched_core::JobId;

pub trait NotificationSink: Send + Sync {
    fn occurrence_created(&self, job_id: JobId) {
        tracing::debug!(job_id = %job_id, "occurrence created");
    }

    fn occurrence_updated(&self, job_id: JobId) {
        tracing::debug!(job_id = %job_id, "occurrence updated");
    }

    fn job_auto_disabled(&self, job_id: JobId) {
        tracing::warn!(job_id = %job_id, "job auto-disabled after repeated failures");
    }

    fn job_re_enabled(&self, job_id: JobId) {
        tracing::info!(job_id = %job_id, "job re-enabled");
    }
}

/// Default sink: every event becomes a structured log line, nothing else.
#[derive(Default)]
pub struct LoggingNotificationSink;

impl NotificationSink for LoggingNotificationSink {}
