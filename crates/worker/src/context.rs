// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scope a consumed job message runs under: identity, a
//! cancellation token, and a logger that tees into the worker outbox
//! instead of publishing logs directly, so a broker hiccup never loses one.

use crate::outbox::Outbox;
use chrono::Utc;
use sched_core::{JobId, LogEntry, LogLevel, OccurrenceId, WorkerId};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct JobContext {
    pub job_id: JobId,
    pub occurrence_id: OccurrenceId,
    pub worker_id: WorkerId,
    pub job_version: u32,
    pub cancellation_token: CancellationToken,
    outbox: Arc<Outbox>,
}

impl JobContext {
    pub fn new(
        job_id: JobId,
        occurrence_id: OccurrenceId,
        worker_id: WorkerId,
        job_version: u32,
        cancellation_token: CancellationToken,
        outbox: Arc<Outbox>,
    ) -> Self {
        Self { job_id, occurrence_id, worker_id, job_version, cancellation_token, outbox }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.log_with(level, message, None, None);
    }

    pub fn log_with(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        category: Option<String>,
        data: Option<serde_json::Value>,
    ) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            data,
            category,
            exception_type: None,
        };
        self.outbox.enqueue_log(self.occurrence_id, self.worker_id, entry);
    }
}
