// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auto-disable controller: counts consecutive Failed/TimedOut
//! terminal events per job, disables the job once it crosses its threshold,
//! and resets the counter on a Completed run.

use crate::errors::DispatchError;
use crate::notify::NotificationSink;
use crate::{due_set, SchedulerEngine};
use chrono::{DateTime, Utc};
use sched_adapters::KvClient;
use sched_core::{Event, JobId, OccurrenceStatus};

pub struct AutoDisableController {
    default_enabled: bool,
    default_threshold: u32,
}

impl AutoDisableController {
    pub fn new(default_enabled: bool, default_threshold: u32) -> Self {
        Self { default_enabled, default_threshold }
    }

    /// Feed one terminal occurrence event into the per-job counter. Only
    /// `Completed` (reset) and `Failed`/`TimedOut` (increment) affect
    /// accounting; `Cancelled` terminal events are left alone, since an
    /// operator-initiated cancellation isn't evidence the job itself is
    /// broken.
    pub async fn record_terminal(
        &self,
        engine: &SchedulerEngine,
        kv: &dyn KvClient,
        notify: &dyn NotificationSink,
        job_id: JobId,
        status: OccurrenceStatus,
        now: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let Some(job) = engine.snapshot_state().get_job(&job_id).cloned() else {
            return Ok(());
        };

        match status {
            OccurrenceStatus::Completed => {
                if job.auto_disable.consecutive_failures != 0 {
                    engine.apply(Event::AutoDisableCountersUpdated { id: job_id, consecutive_failures: 0, at: None })?;
                }
            }
            OccurrenceStatus::Failed | OccurrenceStatus::TimedOut => {
                let mut working = job.clone();
                let should_disable = working.record_failure(now, self.default_enabled, self.default_threshold);
                engine.apply(Event::AutoDisableCountersUpdated {
                    id: job_id,
                    consecutive_failures: working.auto_disable.consecutive_failures,
                    at: working.auto_disable.last_failure_time,
                })?;
                if should_disable && job.active {
                    let snapshot = serde_json::to_string(&job).unwrap_or_default();
                    engine.apply(Event::JobAutoDisabled { id: job_id, at: now, snapshot })?;
                    kv.due_remove(&job_id.to_string()).await?;
                    notify.job_auto_disabled(job_id);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Manual re-activation: resets the counter implicitly via
    /// `ScheduledJob::apply_update`'s `active` field; here we only flip the
    /// flag and re-seed the due set.
    pub async fn re_enable(
        &self,
        engine: &SchedulerEngine,
        kv: &dyn KvClient,
        notify: &dyn NotificationSink,
        job_id: JobId,
        now: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        engine.apply(Event::JobReEnabled { id: job_id, at: now })?;
        if let Some(job) = engine.snapshot_state().get_job(&job_id).cloned() {
            due_set::on_job_updated(kv, &job, now).await?;
        }
        notify.job_re_enabled(job_id);
        Ok(())
    }
}

#[cfg(test)]
#[path = "auto_disable_tests.rs"]
mod tests;
