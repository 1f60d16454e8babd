// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cancellation bus, publish side: a cancel request against a
//! Queued occurrence is resolved directly, since no worker has claimed it
//! yet; a Running occurrence is asked to cancel cooperatively over the KV
//! pub/sub channel and resolves once the worker reports back through the
//! ordinary status-update path.

use crate::errors::DispatchError;
use crate::retry;
use crate::SchedulerEngine;
use chrono::{DateTime, Utc};
use sched_adapters::{BrokerClient, KvClient};
use sched_core::{Event, FailureType, OccurrenceId, OccurrenceStatus};
use tracing::info;

/// What happened as a result of a cancel request, for the caller (e.g. an
/// admin API) to report back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationOutcome {
    /// The occurrence was Queued and is now Cancelled directly.
    CancelledImmediately,
    /// A cancellation message was published; a Running worker will report
    /// back with its own Cancelled status update.
    RequestedFromWorker,
    /// The occurrence was already terminal, or doesn't exist.
    NoOp,
}

pub struct CancellationBus;

impl CancellationBus {
    pub async fn request_cancellation(
        &self,
        engine: &SchedulerEngine,
        kv: &dyn KvClient,
        broker: &dyn BrokerClient,
        occurrence_id: OccurrenceId,
        now: DateTime<Utc>,
    ) -> Result<CancellationOutcome, DispatchError> {
        let Some(occurrence) = engine.snapshot_state().get_occurrence(&occurrence_id).cloned() else {
            return Ok(CancellationOutcome::NoOp);
        };

        match occurrence.status {
            OccurrenceStatus::Queued => {
                engine.apply(Event::OccurrenceStatusChanged {
                    id: occurrence_id,
                    status: OccurrenceStatus::Cancelled,
                    at: now,
                    worker_id: None,
                    result: None,
                    exception: Some("cancelled before a worker claimed it".to_string()),
                })?;
                kv.clear_running(&occurrence.job_id.to_string()).await?;
                retry::record_dead_letter(
                    engine,
                    broker,
                    occurrence.job_id,
                    occurrence_id,
                    "cancelled before a worker claimed it".to_string(),
                    occurrence.retry_attempt,
                    FailureType::Cancelled,
                )
                .await?;
                info!(occurrence_id = %occurrence_id, "cancelled a queued occurrence directly");
                Ok(CancellationOutcome::CancelledImmediately)
            }
            OccurrenceStatus::Running => {
                kv.publish_cancellation(&occurrence_id.to_string()).await?;
                info!(occurrence_id = %occurrence_id, "published cancellation request for a running occurrence");
                Ok(CancellationOutcome::RequestedFromWorker)
            }
            _ => Ok(CancellationOutcome::NoOp),
        }
    }
}

#[cfg(test)]
#[path = "cancellation_tests.rs"]
mod tests;
