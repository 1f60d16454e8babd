// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Occurrence lifecycle: folds worker-reported status updates
//! and logs into the materialized view, then — on a first-time terminal
//! transition — clears the running marker, runs auto-disable accounting,
//! and routes into the retry/DLQ engine.

use crate::auto_disable::AutoDisableController;
use crate::errors::DispatchError;
use crate::notify::NotificationSink;
use crate::retry::{self, RetryDecision, RetryPolicies};
use crate::SchedulerEngine;
use sched_adapters::{BrokerClient, KvClient};
use sched_core::{is_permanent_exception, Event, FailureType, JobOccurrence, OccurrenceStatus, RetryPolicy};
use sched_wire::{LogEnvelope, StatusUpdateEnvelope};
use std::sync::Arc;
use tracing::warn;

pub struct OccurrenceLifecycle {
    retry_policies: RetryPolicies,
}

impl OccurrenceLifecycle {
    pub fn new(retry_policies: RetryPolicies) -> Self {
        Self { retry_policies }
    }

    /// Append one log entry; log messages arrive on a separate queue and are
    /// appended with a server timestamp, preserving their original order.
    pub fn apply_log(&self, engine: &SchedulerEngine, envelope: &LogEnvelope) -> Result<(), DispatchError> {
        engine.apply(Event::OccurrenceLogAppended { id: envelope.correlation_id, entry: envelope.log.clone() })?;
        Ok(())
    }

    /// Apply one status update. Transitions are idempotent by (occurrence
    /// id, target status); a repeat of an already-terminal status is folded
    /// (no-op, per [`JobOccurrence::apply_status`]) and none of the
    /// terminal-only follow-up work below runs again.
    ///
    /// Takes `Arc`-wrapped collaborators rather than borrows because a
    /// `Retry` decision spawns a detached task that must outlive this call.
    pub async fn apply_status_update(
        &self,
        engine: &Arc<SchedulerEngine>,
        kv: &Arc<dyn KvClient>,
        broker: &Arc<dyn BrokerClient>,
        auto_disable: &AutoDisableController,
        notify: &dyn NotificationSink,
        envelope: &StatusUpdateEnvelope,
    ) -> Result<(), DispatchError> {
        let Some(before) = engine.snapshot_state().get_occurrence(&envelope.correlation_id).cloned() else {
            warn!(correlation_id = %envelope.correlation_id, "status update for unknown occurrence, dropping");
            return Ok(());
        };
        let already_resolved = before.status == envelope.status && before.status.is_terminal();

        engine.apply(Event::OccurrenceStatusChanged {
            id: envelope.correlation_id,
            status: envelope.status,
            at: envelope.message_timestamp,
            worker_id: Some(envelope.worker_id),
            result: envelope.result.clone(),
            exception: envelope.exception.clone(),
        })?;

        if already_resolved || !envelope.status.is_terminal() {
            return Ok(());
        }

        let occurrence: JobOccurrence =
            engine.snapshot_state().get_occurrence(&envelope.correlation_id).cloned().unwrap_or(before);

        kv.clear_running(&occurrence.job_id.to_string()).await?;
        notify.occurrence_updated(occurrence.job_id);
        auto_disable
            .record_terminal(engine, kv.as_ref(), notify, occurrence.job_id, occurrence.status, envelope.message_timestamp)
            .await?;

        match occurrence.status {
            OccurrenceStatus::Completed => {}

            // Cancellation via the bus dead-letters immediately; there is
            // no retry ladder for an operator-requested stop.
            OccurrenceStatus::Cancelled => {
                retry::record_dead_letter(
                    engine,
                    broker.as_ref(),
                    occurrence.job_id,
                    occurrence.id,
                    occurrence.exception.clone().unwrap_or_default(),
                    occurrence.retry_attempt,
                    FailureType::Cancelled,
                )
                .await?;
            }

            OccurrenceStatus::TimedOut => {
                let policy = self.policy_for(engine, &occurrence);
                let decision = retry::decide_timed_out(occurrence.retry_attempt, policy);
                self.resolve(engine, kv, broker, &occurrence, decision).await?;
            }

            OccurrenceStatus::Failed => {
                let exception = occurrence.exception.as_deref().unwrap_or_default();
                let permanent = is_permanent_exception(exception);
                let policy = self.policy_for(engine, &occurrence);
                let decision = retry::decide_failed(exception, permanent, occurrence.retry_attempt, policy);
                self.resolve(engine, kv, broker, &occurrence, decision).await?;
            }

            // `Unknown` is only ever produced by the zombie detector, which
            // resolves it directly and never routes through this path.
            OccurrenceStatus::Unknown => {
                warn!(occurrence_id = %occurrence.id, "unexpected worker-reported Unknown status, ignoring");
            }

            OccurrenceStatus::Queued | OccurrenceStatus::Running => unreachable!("guarded by is_terminal() above"),
        }

        Ok(())
    }

    fn policy_for(&self, engine: &SchedulerEngine, occurrence: &JobOccurrence) -> RetryPolicy {
        let handler_name =
            engine.snapshot_state().get_job(&occurrence.job_id).map(|job| job.handler_name.clone()).unwrap_or_default();
        self.retry_policies.for_handler(&handler_name)
    }

    async fn resolve(
        &self,
        engine: &Arc<SchedulerEngine>,
        kv: &Arc<dyn KvClient>,
        broker: &Arc<dyn BrokerClient>,
        occurrence: &JobOccurrence,
        decision: RetryDecision,
    ) -> Result<(), DispatchError> {
        match decision {
            RetryDecision::Retry { delay, next_attempt } => {
                tokio::spawn(retry::schedule_retry(
                    engine.clone(),
                    broker.clone(),
                    kv.clone(),
                    occurrence.job_id,
                    next_attempt,
                    delay,
                ));
                Ok(())
            }
            RetryDecision::DeadLetter { failure_type } => {
                retry::record_dead_letter(
                    engine,
                    broker.as_ref(),
                    occurrence.job_id,
                    occurrence.id,
                    occurrence.exception.clone().unwrap_or_default(),
                    occurrence.retry_attempt,
                    failure_type,
                )
                .await
            }
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
