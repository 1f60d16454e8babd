// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job consumer runtime: one process, up to `maxParallelJobs`
//! concurrent executions, broker prefetch equal to that bound. Mirrors the
//! re-arm-first polling idiom used on the scheduler side for periodic work:
//! the outer loop keeps pulling deliveries regardless of how any single job
//! turns out, and each job's outcome is fully contained in its own task.

use crate::cancellation::CancellationRegistry;
use crate::context::JobContext;
use crate::handlers::HandlerRegistry;
use crate::outbox::Outbox;
use chrono::Utc;
use sched_adapters::{BrokerClient, JobConsumer, JobDelivery};
use sched_core::{mark_permanent_exception, OccurrenceId, OccurrenceStatus, WorkerId};
use sched_wire::{JobMessageEnvelope, StatusUpdateEnvelope};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Per-handler timeout overrides and the worker-wide default, matching the
/// `?? per-occurrence ?? per-handler ?? worker default` chain.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub worker_id: WorkerId,
    pub max_parallel_jobs: u32,
    pub default_execution_timeout_seconds: i64,
    pub handler_timeout_overrides: HashMap<String, i64>,
}

fn effective_timeout(config: &RuntimeConfig, envelope: &JobMessageEnvelope) -> Option<Duration> {
    let seconds = envelope
        .execution_timeout_seconds
        .or_else(|| config.handler_timeout_overrides.get(&envelope.job_name).copied())
        .unwrap_or(config.default_execution_timeout_seconds);
    if seconds <= 0 {
        None
    } else {
        Some(Duration::from_secs(seconds as u64))
    }
}

enum HandlerOutcome {
    Ran(Result<Option<String>, crate::handlers::HandlerError>),
    TimedOut,
    Cancelled,
}

/// Occurrences this process currently has running, shared with the
/// heartbeat sender so it can list them without a per-job timer of its own.
#[derive(Default, Clone)]
pub struct RunningJobs {
    inner: Arc<std::sync::Mutex<HashSet<OccurrenceId>>>,
}

impl RunningJobs {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, occurrence_id: OccurrenceId) {
        self.inner.lock().unwrap().insert(occurrence_id);
    }

    fn remove(&self, occurrence_id: &OccurrenceId) {
        self.inner.lock().unwrap().remove(occurrence_id);
    }

    pub fn snapshot(&self) -> Vec<OccurrenceId> {
        self.inner.lock().unwrap().iter().copied().collect()
    }
}

#[derive(Clone)]
pub struct ConsumerRuntime {
    config: RuntimeConfig,
    handlers: Arc<HandlerRegistry>,
    broker: Arc<dyn BrokerClient>,
    outbox: Arc<Outbox>,
    cancellations: CancellationRegistry,
    running: RunningJobs,
}

impl ConsumerRuntime {
    pub fn new(
        config: RuntimeConfig,
        handlers: Arc<HandlerRegistry>,
        broker: Arc<dyn BrokerClient>,
        outbox: Arc<Outbox>,
        cancellations: CancellationRegistry,
        running: RunningJobs,
    ) -> Self {
        Self { config, handlers, broker, outbox, cancellations, running }
    }

    pub async fn run(&self, consumer: Box<dyn JobConsumer>, shutdown: CancellationToken) {
        let consumer = Arc::new(AsyncMutex::new(consumer));
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_jobs.max(1) as usize));

        loop {
            let delivery = tokio::select! {
                result = async { consumer.lock().await.next().await } => result,
                _ = shutdown.cancelled() => break,
            };

            let delivery = match delivery {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    info!("job consumer stream ended");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "error pulling next job delivery, continuing");
                    continue;
                }
            };

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let this = self.clone();
            let consumer = Arc::clone(&consumer);
            tokio::spawn(async move {
                let _permit = permit;
                this.process(delivery, consumer).await;
            });
        }
    }

    async fn process(&self, delivery: JobDelivery, consumer: Arc<AsyncMutex<Box<dyn JobConsumer>>>) {
        let JobDelivery { envelope, delivery_tag, .. } = delivery;
        let occurrence_id = envelope.correlation_id;
        let job_id = envelope.job_id;

        let Some(handler) = self.handlers.get(&envelope.job_name) else {
            warn!(job_name = %envelope.job_name, occurrence_id = %occurrence_id, "no handler registered for this job name");
            self.send_status(StatusUpdateEnvelope {
                correlation_id: occurrence_id,
                job_id,
                worker_id: self.config.worker_id,
                status: OccurrenceStatus::Failed,
                start_time: Some(Utc::now()),
                end_time: Some(Utc::now()),
                duration_ms: None,
                result: None,
                exception: Some(mark_permanent_exception(format!("no handler registered for '{}'", envelope.job_name))),
                message_timestamp: Utc::now(),
            })
            .await;
            let _ = consumer.lock().await.ack(delivery_tag).await;
            return;
        };

        let start_time = Utc::now();
        self.send_status(StatusUpdateEnvelope {
            correlation_id: occurrence_id,
            job_id,
            worker_id: self.config.worker_id,
            status: OccurrenceStatus::Running,
            start_time: Some(start_time),
            end_time: None,
            duration_ms: None,
            result: None,
            exception: None,
            message_timestamp: start_time,
        })
        .await;
        self.running.insert(occurrence_id);

        let token = CancellationToken::new();
        self.cancellations.track(occurrence_id, token.clone());
        let ctx = JobContext::new(job_id, occurrence_id, self.config.worker_id, envelope.job_version, token.clone(), Arc::clone(&self.outbox));

        let outcome = match effective_timeout(&self.config, &envelope) {
            Some(timeout) => tokio::select! {
                result = handler.dispatch(&ctx, &envelope.job_data) => HandlerOutcome::Ran(result),
                _ = tokio::time::sleep(timeout) => HandlerOutcome::TimedOut,
                _ = token.cancelled() => HandlerOutcome::Cancelled,
            },
            None => tokio::select! {
                result = handler.dispatch(&ctx, &envelope.job_data) => HandlerOutcome::Ran(result),
                _ = token.cancelled() => HandlerOutcome::Cancelled,
            },
        };

        self.cancellations.untrack(&occurrence_id);
        self.running.remove(&occurrence_id);

        let end_time = Utc::now();
        let duration_ms = Some((end_time - start_time).num_milliseconds());
        let (status, result, exception) = match outcome {
            HandlerOutcome::Ran(Ok(result)) => (OccurrenceStatus::Completed, result, None),
            HandlerOutcome::Ran(Err(crate::handlers::HandlerError::InvalidPayload(message))) => {
                (OccurrenceStatus::Failed, None, Some(mark_permanent_exception(format!("invalid job data: {message}"))))
            }
            HandlerOutcome::Ran(Err(crate::handlers::HandlerError::Permanent(message))) => {
                (OccurrenceStatus::Failed, None, Some(mark_permanent_exception(message)))
            }
            HandlerOutcome::Ran(Err(crate::handlers::HandlerError::Transient(message))) => (OccurrenceStatus::Failed, None, Some(message)),
            HandlerOutcome::TimedOut => (OccurrenceStatus::TimedOut, None, Some("execution exceeded the effective timeout".to_string())),
            HandlerOutcome::Cancelled => (OccurrenceStatus::Cancelled, None, Some("cancelled by scheduler request".to_string())),
        };

        if !matches!(status, OccurrenceStatus::Completed) {
            error!(occurrence_id = %occurrence_id, job_id = %job_id, status = %status, "job finished with a non-terminal-success outcome");
        }

        self.send_status(StatusUpdateEnvelope {
            correlation_id: occurrence_id,
            job_id,
            worker_id: self.config.worker_id,
            status,
            start_time: Some(start_time),
            end_time: Some(end_time),
            duration_ms,
            result,
            exception,
            message_timestamp: end_time,
        })
        .await;

        // Always ack: a transient publish failure routes the status update
        // through the outbox instead, and is not a reason to redeliver a
        // job that already ran — this runtime never nacks at all.
        if let Err(err) = consumer.lock().await.ack(delivery_tag).await {
            warn!(error = %err, occurrence_id = %occurrence_id, "failed to ack job delivery");
        }
    }

    async fn send_status(&self, envelope: StatusUpdateEnvelope) {
        if let Err(err) = self.broker.publish_status_update(&envelope).await {
            warn!(error = %err, occurrence_id = %envelope.correlation_id, "status update publish failed, queuing in outbox");
            if let Err(err) = self.outbox.enqueue_status_update(&envelope) {
                error!(error = %err, occurrence_id = %envelope.correlation_id, "failed to persist status update to outbox");
            }
        }
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
