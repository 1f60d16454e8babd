// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatcher: exactly one active tick loop across the fleet,
//! enforced by a TTL-refreshed leader lock. A non-leader waits and retries
//! acquisition; the leader polls `due`, creates and publishes occurrences
//! under a per-job lock, and advances each job's schedule.

use crate::errors::DispatchError;
use crate::notify::NotificationSink;
use crate::retry::{self, RetryDecision, RetryPolicies};
use crate::{due_set, SchedulerEngine};
use chrono::Utc;
use sched_adapters::{BrokerClient, KvClient};
use sched_core::{ConcurrencyPolicy, Event, FailureType, JobId, OccurrenceId};
use sched_wire::JobMessageEnvelope;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const LEADER_LOCK_ID: &str = "leader:dispatcher";

#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    pub batch_size: usize,
    pub poll_interval: std::time::Duration,
    pub job_lock_ttl_seconds: u64,
    pub leader_lock_ttl_seconds: u64,
    pub running_ttl_slack_seconds: u64,
    pub default_execution_timeout_seconds: i64,
}

/// What one job's dispatch step resulted in, for tick-level accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched,
    Skipped,
    Dropped,
}

pub struct Dispatcher {
    config: DispatcherConfig,
    retry_policies: RetryPolicies,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig, retry_policies: RetryPolicies) -> Self {
        Self { config, retry_policies }
    }

    /// Run the leader-election loop until `cancel` fires. Never returns
    /// early on a transient KV error; it just retries next iteration.
    pub async fn run(
        &self,
        engine: Arc<SchedulerEngine>,
        kv: Arc<dyn KvClient>,
        broker: Arc<dyn BrokerClient>,
        notify: Arc<dyn NotificationSink>,
        cancel: CancellationToken,
    ) {
        while !cancel.is_cancelled() {
            match kv.acquire_lock(LEADER_LOCK_ID, self.config.leader_lock_ttl_seconds).await {
                Ok(Some(token)) => {
                    info!("acquired dispatcher leader lock");
                    self.lead(&engine, &kv, &broker, notify.as_ref(), &token, &cancel).await;
                    if let Err(err) = kv.release_lock(LEADER_LOCK_ID, &token).await {
                        warn!(error = %err, "failed to release dispatcher leader lock on step-down");
                    }
                }
                Ok(None) => self.sleep_or_cancel(&cancel).await,
                Err(err) => {
                    warn!(error = %err, "failed to attempt dispatcher leader acquisition");
                    self.sleep_or_cancel(&cancel).await;
                }
            }
        }
    }

    async fn sleep_or_cancel(&self, cancel: &CancellationToken) {
        tokio::select! {
            _ = tokio::time::sleep(self.config.poll_interval) => {}
            _ = cancel.cancelled() => {}
        }
    }

    /// Hold the leader role: refresh the lock and tick until it's lost or
    /// cancellation is requested.
    async fn lead(
        &self,
        engine: &Arc<SchedulerEngine>,
        kv: &Arc<dyn KvClient>,
        broker: &Arc<dyn BrokerClient>,
        notify: &dyn NotificationSink,
        token: &sched_adapters::LockToken,
        cancel: &CancellationToken,
    ) {
        while !cancel.is_cancelled() {
            match kv.refresh_lock(LEADER_LOCK_ID, token, self.config.leader_lock_ttl_seconds).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!("lost dispatcher leader lock, stepping down");
                    return;
                }
                Err(err) => {
                    warn!(error = %err, "failed to refresh dispatcher leader lock, stepping down");
                    return;
                }
            }

            match kv.emergency_stop_set().await {
                Ok(true) => {
                    self.sleep_or_cancel(cancel).await;
                    continue;
                }
                Ok(false) => {}
                Err(err) => warn!(error = %err, "failed to read emergency-stop flag"),
            }

            if let Err(err) = self.tick(engine, kv, broker, notify).await {
                warn!(error = %err, "dispatcher tick failed");
            }
            self.sleep_or_cancel(cancel).await;
        }
    }

    /// One pass over the due set.
    async fn tick(
        &self,
        engine: &Arc<SchedulerEngine>,
        kv: &Arc<dyn KvClient>,
        broker: &Arc<dyn BrokerClient>,
        notify: &dyn NotificationSink,
    ) -> Result<(), DispatchError> {
        let now = Utc::now();
        let due_ids = kv.due_before(now, self.config.batch_size).await?;
        let mut dispatched = 0usize;
        let mut skipped = 0usize;
        let mut dropped = 0usize;

        for job_id_str in due_ids {
            let job_id = JobId::from_string(&job_id_str);
            let lock_id = format!("lock:{job_id}");
            let Some(token) = kv.acquire_lock(&lock_id, self.config.job_lock_ttl_seconds).await? else {
                // Another dispatcher tick (a race during leader handoff) or
                // an in-flight retry already holds this job's lock; leave it
                // in `due` for the next tick.
                continue;
            };

            let outcome = self.dispatch_one(engine, kv, broker, notify, job_id, now).await;
            if let Err(err) = kv.release_lock(&lock_id, &token).await {
                warn!(job_id = %job_id, error = %err, "failed to release per-job dispatch lock");
            }

            match outcome {
                Ok(DispatchOutcome::Dispatched) => dispatched += 1,
                Ok(DispatchOutcome::Skipped) => skipped += 1,
                Ok(DispatchOutcome::Dropped) => dropped += 1,
                Err(err) => warn!(job_id = %job_id, error = %err, "failed to dispatch due job"),
            }
        }

        if dispatched + skipped + dropped > 0 {
            info!(dispatched, skipped, dropped, "dispatcher tick complete");
        }
        Ok(())
    }

    /// Load (cache first, then store), check active/policy, create and
    /// publish the occurrence, advance the schedule.
    async fn dispatch_one(
        &self,
        engine: &Arc<SchedulerEngine>,
        kv: &Arc<dyn KvClient>,
        broker: &Arc<dyn BrokerClient>,
        notify: &dyn NotificationSink,
        job_id: JobId,
        now: chrono::DateTime<Utc>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let job = match self.load_job(engine, kv, job_id).await? {
            Some(job) => job,
            // Cache-miss and store-miss: leave the id in `due`, retry next tick.
            None => return Ok(DispatchOutcome::Dropped),
        };

        if !job.active {
            kv.due_remove(&job_id.to_string()).await?;
            return Ok(DispatchOutcome::Skipped);
        }

        if job.concurrency_policy == ConcurrencyPolicy::Skip {
            let already_running = kv.is_running(&job_id.to_string()).await?;
            let already_queued = !engine.snapshot_state().non_terminal_occurrences_for(&job_id).is_empty();
            if already_running || already_queued {
                self.log_skip(engine, job_id)?;
                due_set::on_job_updated(kv, &job, now).await?;
                return Ok(DispatchOutcome::Skipped);
            }
        }

        let occurrence_id = OccurrenceId::new();
        engine.apply(Event::OccurrenceCreated { id: occurrence_id, job_id, job_version_snapshot: job.version, at: now })?;

        let envelope = JobMessageEnvelope {
            job_id,
            correlation_id: occurrence_id,
            job_name: job.handler_name.clone(),
            job_data: job.payload.clone(),
            job_version: job.version,
            execution_timeout_seconds: job.execution_timeout_seconds,
            zombie_timeout_minutes: job.zombie_timeout_minutes,
            published_at: now,
        };

        match broker.publish_job(&job.handler_name, &envelope).await {
            Ok(()) => {
                let exec_timeout = job.execution_timeout_seconds.unwrap_or(self.config.default_execution_timeout_seconds).max(0) as u64;
                let zombie_timeout = job.zombie_timeout_minutes.unwrap_or(10) as u64 * 60;
                let ttl = exec_timeout.max(zombie_timeout) + self.config.running_ttl_slack_seconds;
                kv.mark_running(&job_id.to_string(), &occurrence_id.to_string(), ttl).await?;
                notify.occurrence_created(job_id);
            }
            Err(err) => {
                warn!(job_id = %job_id, occurrence_id = %occurrence_id, error = %err, "broker publish failed, handing off to retry engine");
                engine.apply(Event::OccurrenceStatusChanged {
                    id: occurrence_id,
                    status: sched_core::OccurrenceStatus::Failed,
                    at: now,
                    worker_id: None,
                    result: None,
                    exception: Some(err.to_string()),
                })?;
                let policy = self.retry_policies.for_handler(&job.handler_name);
                match retry::decide_dependency_failure(0, policy) {
                    RetryDecision::Retry { delay, next_attempt } => {
                        warn!(job_id = %job_id, delay_secs = delay.as_secs(), next_attempt, "broker publish failed, will retry");
                        tokio::spawn(retry::schedule_retry(
                            engine.clone(),
                            broker.clone(),
                            kv.clone(),
                            job_id,
                            next_attempt,
                            delay,
                        ));
                    }
                    RetryDecision::DeadLetter { failure_type } => {
                        retry::record_dead_letter(engine, broker.as_ref(), job_id, occurrence_id, err.to_string(), 0, failure_type).await?;
                    }
                }
            }
        }

        due_set::on_job_updated(kv, &job, now).await?;
        Ok(DispatchOutcome::Dispatched)
    }

    fn log_skip(&self, engine: &SchedulerEngine, job_id: JobId) -> Result<(), DispatchError> {
        if let Some(occurrence) = engine.snapshot_state().non_terminal_occurrences_for(&job_id).first().map(|o| o.id) {
            engine.apply(Event::OccurrenceLogAppended {
                id: occurrence,
                entry: sched_core::LogEntry {
                    timestamp: Utc::now(),
                    level: sched_core::LogLevel::Info,
                    message: "job already running or queued, skipped under Skip concurrency policy".to_string(),
                    data: None,
                    category: Some("dispatcher".to_string()),
                    exception_type: None,
                },
            })?;
        }
        Ok(())
    }

    async fn load_job(
        &self,
        engine: &SchedulerEngine,
        kv: &dyn KvClient,
        job_id: JobId,
    ) -> Result<Option<sched_core::ScheduledJob>, DispatchError> {
        if let Some(job) = engine.snapshot_state().get_job(&job_id).cloned() {
            return Ok(Some(job));
        }
        match kv.cached_job(&job_id.to_string()).await? {
            Some(payload) => match serde_json::from_str(&payload) {
                Ok(job) => Ok(Some(job)),
                Err(err) => {
                    warn!(job_id = %job_id, error = %err, "poisoned job cache entry, dropping from this tick");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
