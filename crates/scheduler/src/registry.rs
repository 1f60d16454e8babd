// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker registry + heartbeat: folds registration and
//! heartbeat envelopes into the materialized `WorkerRecord` view and the KV
//! instance-TTL projection, and refreshes each reported occurrence's
//! `lastHeartbeat` from the worker's job heartbeat list.

use crate::errors::DispatchError;
use crate::SchedulerEngine;
use chrono::{DateTime, Utc};
use sched_adapters::{KvClient, KvError};
use sched_core::{Event, InstanceId, WorkerId, WorkerInstance, WorkerStatus};
use sched_wire::{HeartbeatEnvelope, RegistrationEnvelope};

pub struct WorkerRegistry {
    instance_ttl_seconds: u64,
}

impl WorkerRegistry {
    pub fn new(instance_ttl_seconds: u64) -> Self {
        Self { instance_ttl_seconds }
    }

    /// A worker's startup registration message: records the worker hash, or
    /// merges with an existing one by adding this instance.
    pub async fn handle_registration(
        &self,
        engine: &SchedulerEngine,
        kv: &dyn KvClient,
        envelope: &RegistrationEnvelope,
        now: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let instance = WorkerInstance {
            instance_id: envelope.instance_id,
            current_jobs: 0,
            max_parallel_jobs: envelope.handlers.iter().map(|h| h.max_parallel_jobs).max().unwrap_or(0),
            last_heartbeat: now,
            status: WorkerStatus::Active,
            job_heartbeats: Vec::new(),
        };
        engine.apply(Event::WorkerRegistered {
            worker_id: envelope.worker_id,
            handlers: envelope.handlers.clone(),
            version: envelope.version,
            instance,
        })?;

        let payload = serde_json::to_string(envelope).map_err(KvError::Encode)?;
        kv.upsert_worker(&envelope.worker_id.to_string(), &payload).await?;
        kv.upsert_worker_instance(
            &envelope.worker_id.to_string(),
            &envelope.instance_id.to_string(),
            &payload,
            self.instance_ttl_seconds,
        )
        .await?;
        Ok(())
    }

    /// A worker instance's periodic heartbeat: refreshes instance TTL and
    /// reports `{currentJobs, maxParallelJobs, status, jobHeartbeats}`.
    pub async fn handle_heartbeat(
        &self,
        engine: &SchedulerEngine,
        kv: &dyn KvClient,
        envelope: &HeartbeatEnvelope,
        now: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        // The materialized-state handler for `WorkerHeartbeat`
        // (`sched-storage::state::workers`) already walks `job_heartbeats`
        // and refreshes each occurrence's `lastHeartbeat`, so this is the
        // only event we need to emit here.
        let instance = WorkerInstance {
            instance_id: envelope.instance_id,
            current_jobs: envelope.current_jobs,
            max_parallel_jobs: envelope.max_parallel_jobs,
            last_heartbeat: now,
            status: envelope.status,
            job_heartbeats: envelope.jobs.iter().map(|j| j.correlation_id).collect(),
        };
        engine.apply(Event::WorkerHeartbeat { worker_id: envelope.worker_id, instance })?;

        let payload = serde_json::to_string(envelope).map_err(KvError::Encode)?;
        kv.upsert_worker_instance(
            &envelope.worker_id.to_string(),
            &envelope.instance_id.to_string(),
            &payload,
            self.instance_ttl_seconds,
        )
        .await?;
        Ok(())
    }

    /// A graceful-stop signal: the instance stays in the record (the derived
    /// `Shutdown` status requires every instance to have reported one) but
    /// no longer counts toward `Active`.
    pub fn handle_shutdown(&self, engine: &SchedulerEngine, worker_id: WorkerId, instance_id: InstanceId) -> Result<(), DispatchError> {
        engine.apply(Event::WorkerInstanceShutdown { worker_id, instance_id })?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
