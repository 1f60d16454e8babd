// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry & DLQ engine: computes back-off, re-publishes, or
//! dead-letters a terminal Failed/TimedOut/Unknown occurrence.

use crate::errors::DispatchError;
use crate::{due_set, SchedulerEngine};
use chrono::Utc;
use sched_adapters::{BrokerClient, KvClient};
use sched_core::{
    Event, FailureType, JobId, JobOccurrence, OccurrenceId, OccurrenceStatus, Outcome, RetryPolicy,
};
use sched_wire::JobMessageEnvelope;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// What the retry engine decided to do with a Failed occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration, next_attempt: u32 },
    DeadLetter { failure_type: FailureType },
}

/// Pure decision function: a non-permanent Failed occurrence
/// under the attempt ceiling is retried with exponential back-off;
/// everything else is dead-lettered with a classified failure type.
/// `exception` is the worker-reported message, used to distinguish
/// `InvalidJobData` from `UnhandledException` for a permanent failure.
pub fn decide_failed(exception: &str, permanent: bool, attempt: u32, policy: RetryPolicy) -> RetryDecision {
    if !permanent && policy.should_retry(attempt) {
        return RetryDecision::Retry { delay: policy.delay_for(attempt), next_attempt: attempt + 1 };
    }
    let outcome = Outcome::Failed { message: exception.to_string(), permanent };
    let failure_type = outcome.classify(attempt, policy.max_attempts).unwrap_or(FailureType::UnhandledException);
    RetryDecision::DeadLetter { failure_type }
}

/// Same ladder as [`decide_failed`], but for a `TimedOut` terminal event:
/// the final dead-letter is always classified `Timeout`, not derived from
/// attempt count ("TimedOut past the final attempt").
pub fn decide_timed_out(attempt: u32, policy: RetryPolicy) -> RetryDecision {
    if policy.should_retry(attempt) {
        RetryDecision::Retry { delay: policy.delay_for(attempt), next_attempt: attempt + 1 }
    } else {
        RetryDecision::DeadLetter { failure_type: FailureType::Timeout }
    }
}

/// Same ladder again, for a broker/KV error encountered while dispatching
/// or republishing.
pub fn decide_dependency_failure(attempt: u32, policy: RetryPolicy) -> RetryDecision {
    if policy.should_retry(attempt) {
        RetryDecision::Retry { delay: policy.delay_for(attempt), next_attempt: attempt + 1 }
    } else {
        RetryDecision::DeadLetter { failure_type: FailureType::ExternalDependencyFailure }
    }
}

/// Per-handler retry policies, with a fallback for handlers that don't
/// declare one.
#[derive(Clone)]
pub struct RetryPolicies {
    by_handler: HashMap<String, RetryPolicy>,
    default: RetryPolicy,
}

impl RetryPolicies {
    pub fn new(default: RetryPolicy) -> Self {
        Self { by_handler: HashMap::new(), default }
    }

    pub fn insert(&mut self, handler_name: impl Into<String>, policy: RetryPolicy) {
        self.by_handler.insert(handler_name.into(), policy);
    }

    pub fn for_handler(&self, handler_name: &str) -> RetryPolicy {
        self.by_handler.get(handler_name).copied().unwrap_or(self.default)
    }
}

/// Persists a [`sched_core::FailedOccurrence`] and publishes it to the
/// failed-occurrences queue. Shared by the retry engine and the
/// zombie detector, since both paths land in the same DLQ projection.
pub async fn record_dead_letter(
    engine: &SchedulerEngine,
    broker: &dyn BrokerClient,
    job_id: JobId,
    occurrence_id: OccurrenceId,
    final_exception: String,
    retry_count_at_failure: u32,
    failure_type: FailureType,
) -> Result<(), DispatchError> {
    let at = Utc::now();
    engine.apply(Event::FailedOccurrenceRecorded {
        job_id,
        occurrence_id,
        final_exception: final_exception.clone(),
        retry_count_at_failure,
        failure_type,
        at,
    })?;

    let failed = engine
        .snapshot_state()
        .failed_occurrences
        .get(&occurrence_id)
        .cloned()
        .unwrap_or_else(|| {
            sched_core::FailedOccurrence::new(job_id, occurrence_id, final_exception, retry_count_at_failure, failure_type, at)
        });
    broker.publish_failed_occurrence(&failed).await?;
    warn!(job_id = %job_id, occurrence_id = %occurrence_id, failure_type = %failure_type, "occurrence dead-lettered");
    Ok(())
}

/// Re-publishes a fresh occurrence for `job_id` after `delay`, with a new
/// correlation id and `retry_attempt` incremented.
pub async fn schedule_retry(
    engine: Arc<SchedulerEngine>,
    broker: Arc<dyn BrokerClient>,
    kv: Arc<dyn KvClient>,
    job_id: JobId,
    retry_attempt: u32,
    delay: Duration,
) {
    tokio::time::sleep(delay).await;

    let job = match engine.snapshot_state().get_job(&job_id).cloned() {
        Some(job) if job.active => job,
        Some(_) => {
            info!(job_id = %job_id, "skipping retry republish, job has been deactivated");
            return;
        }
        None => {
            warn!(job_id = %job_id, "skipping retry republish, job no longer exists");
            return;
        }
    };

    let occurrence_id = OccurrenceId::new();
    let now = Utc::now();
    if let Err(err) = engine.apply(Event::OccurrenceCreated {
        id: occurrence_id,
        job_id,
        job_version_snapshot: job.version,
        at: now,
    }) {
        warn!(job_id = %job_id, error = %err, "failed to persist retry occurrence");
        return;
    }

    let mut occurrence = engine.snapshot_state().occurrences.get(&occurrence_id).cloned().unwrap_or_else(|| {
        JobOccurrence::new(occurrence_id, job_id, job.version, now)
    });
    occurrence.retry_attempt = retry_attempt;

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

    let routing_key = job.handler_name.clone();
    match broker.publish_job(&routing_key, &envelope).await {
        Ok(()) => {
            let ttl = due_set::JOB_CACHE_TTL_SECONDS.min(3600);
            if let Err(err) = kv.mark_running(&job_id.to_string(), &occurrence_id.to_string(), ttl).await {
                warn!(job_id = %job_id, error = %err, "failed to mark job running after retry republish");
            }
        }
        Err(err) => {
            warn!(job_id = %job_id, occurrence_id = %occurrence_id, error = %err, "retry republish failed to reach broker");
            let _ = engine.apply(Event::OccurrenceStatusChanged {
                id: occurrence_id,
                status: OccurrenceStatus::Failed,
                at: Utc::now(),
                worker_id: None,
                result: None,
                exception: Some(err.to_string()),
            });
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
