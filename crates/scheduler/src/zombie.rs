// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Zombie detector: finds Queued occurrences stuck past their
//! zombie timeout and Running occurrences whose heartbeat has gone stale,
//! and resolves each straight to the dead-letter projection rather than
//! through the ordinary retry ladder — a stuck or crashed run needs
//! investigation, not an automatic repeat.

use crate::auto_disable::AutoDisableController;
use crate::notify::NotificationSink;
use crate::{retry, DispatchError, SchedulerEngine};
use chrono::{DateTime, Duration, Utc};
use sched_adapters::{BrokerClient, KvClient};
use sched_core::{Event, FailureType, JobId, OccurrenceId, OccurrenceStatus};
use sched_storage::MaterializedState;
use tracing::warn;

/// What one sweep found and resolved, surfaced for logging/metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZombieSweepReport {
    pub queued_timed_out: usize,
    pub running_crashed: usize,
}

pub struct ZombieDetector {
    default_zombie_timeout: Duration,
    heartbeat_threshold: Duration,
}

impl ZombieDetector {
    pub fn new(default_zombie_timeout_minutes: u32, heartbeat_threshold_seconds: u64) -> Self {
        Self {
            default_zombie_timeout: Duration::minutes(default_zombie_timeout_minutes as i64),
            heartbeat_threshold: Duration::seconds(heartbeat_threshold_seconds as i64),
        }
    }

    fn zombie_timeout_for(&self, state: &MaterializedState, job_id: JobId, occ_override: Option<u32>) -> Duration {
        if let Some(minutes) = occ_override {
            return Duration::minutes(minutes as i64);
        }
        if let Some(minutes) = state.get_job(&job_id).and_then(|j| j.zombie_timeout_minutes) {
            return Duration::minutes(minutes as i64);
        }
        self.default_zombie_timeout
    }

    /// Run one sweep. Safe to call from multiple scheduler processes
    /// concurrently: resolving an occurrence is idempotent (terminal
    /// occurrences are skipped), so at worst two sweeps race harmlessly on
    /// the same id.
    pub async fn sweep(
        &self,
        engine: &SchedulerEngine,
        kv: &dyn KvClient,
        broker: &dyn BrokerClient,
        auto_disable: &AutoDisableController,
        notify: &dyn NotificationSink,
        now: DateTime<Utc>,
    ) -> Result<ZombieSweepReport, DispatchError> {
        let (queued_timed_out, running_stale) = {
            let state = engine.snapshot_state();
            let mut queued_timed_out = Vec::new();
            let mut running_stale = Vec::new();
            for occ in state.occurrences.values() {
                match occ.status {
                    OccurrenceStatus::Queued => {
                        let timeout = self.zombie_timeout_for(&state, occ.job_id, occ.zombie_timeout_minutes);
                        let queued_at = occ.status_history.first().map(|c| c.at).unwrap_or(occ.start_time.unwrap_or(now));
                        if now - queued_at > timeout {
                            queued_timed_out.push(occ.id);
                        }
                    }
                    OccurrenceStatus::Running => {
                        let last_seen = occ.last_heartbeat.or(occ.start_time);
                        if let Some(last_seen) = last_seen {
                            if now - last_seen > self.heartbeat_threshold {
                                running_stale.push(occ.id);
                            }
                        }
                    }
                    _ => {}
                }
            }
            (queued_timed_out, running_stale)
        };

        for occurrence_id in &queued_timed_out {
            self.resolve_queued_zombie(engine, kv, broker, auto_disable, notify, *occurrence_id, now).await?;
        }
        for occurrence_id in &running_stale {
            self.resolve_worker_crash(engine, kv, broker, notify, *occurrence_id, now).await?;
        }

        Ok(ZombieSweepReport { queued_timed_out: queued_timed_out.len(), running_crashed: running_stale.len() })
    }

    async fn resolve_queued_zombie(
        &self,
        engine: &SchedulerEngine,
        kv: &dyn KvClient,
        broker: &dyn BrokerClient,
        auto_disable: &AutoDisableController,
        notify: &dyn NotificationSink,
        occurrence_id: OccurrenceId,
        now: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let Some(occ) = engine.snapshot_state().get_occurrence(&occurrence_id).cloned() else { return Ok(()) };
        if occ.status.is_terminal() {
            return Ok(());
        }
        let exception = "zombie detection: occurrence was never claimed by a worker".to_string();
        engine.apply(Event::OccurrenceStatusChanged {
            id: occurrence_id,
            status: OccurrenceStatus::Failed,
            at: now,
            worker_id: occ.worker_id,
            result: None,
            exception: Some(exception.clone()),
        })?;
        kv.clear_running(&occ.job_id.to_string()).await?;
        retry::record_dead_letter(engine, broker, occ.job_id, occurrence_id, exception, occ.retry_attempt, FailureType::ZombieDetection)
            .await?;
        auto_disable.record_terminal(engine, kv, notify, occ.job_id, OccurrenceStatus::Failed, now).await?;
        notify.occurrence_updated(occ.job_id);
        warn!(occurrence_id = %occurrence_id, job_id = %occ.job_id, "occurrence zombie-detected while queued");
        Ok(())
    }

    async fn resolve_worker_crash(
        &self,
        engine: &SchedulerEngine,
        kv: &dyn KvClient,
        broker: &dyn BrokerClient,
        notify: &dyn NotificationSink,
        occurrence_id: OccurrenceId,
        now: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let Some(occ) = engine.snapshot_state().get_occurrence(&occurrence_id).cloned() else { return Ok(()) };
        if occ.status.is_terminal() {
            return Ok(());
        }
        let exception = "worker heartbeat went stale while the occurrence was running".to_string();
        // `Unknown` only comes from this path; it has no retry ladder of its
        // own, the indeterminate outcome is resolved once, here.
        engine.apply(Event::OccurrenceStatusChanged {
            id: occurrence_id,
            status: OccurrenceStatus::Unknown,
            at: now,
            worker_id: occ.worker_id,
            result: None,
            exception: Some(exception.clone()),
        })?;
        kv.clear_running(&occ.job_id.to_string()).await?;
        retry::record_dead_letter(engine, broker, occ.job_id, occurrence_id, exception, occ.retry_attempt, FailureType::WorkerCrash)
            .await?;
        notify.occurrence_updated(occ.job_id);
        warn!(occurrence_id = %occurrence_id, job_id = %occ.job_id, "occurrence marked Unknown, worker presumed crashed");
        Ok(())
    }
}

#[cfg(test)]
#[path = "zombie_tests.rs"]
mod tests;
