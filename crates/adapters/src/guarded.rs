// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Circuit-breaker-wrapped `BrokerClient`/`KvClient`. Every method delegates
//! to the inner client through [`CircuitBreaker::call`]; an open breaker
//! turns into the same error type the trait already returns, so callers
//! don't need to know whether they're talking to a guarded or bare client.

use crate::broker::{BrokerClient, BrokerError, JobConsumer, RawConsumer};
use crate::circuit::{CircuitBreaker, CircuitError};
use crate::kv::{CancellationSubscription, KvClient, KvError, LockToken};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sched_core::{Clock, FailedOccurrence};
use sched_wire::{HeartbeatEnvelope, JobMessageEnvelope, LogEnvelope, RegistrationEnvelope, StatusUpdateEnvelope};
use std::sync::Arc;

fn unwrap_kv(err: CircuitError<KvError>) -> KvError {
    match err {
        CircuitError::Open => KvError::Connection("circuit breaker open".to_string()),
        CircuitError::Inner(e) => e,
    }
}

fn unwrap_broker(err: CircuitError<BrokerError>) -> BrokerError {
    match err {
        CircuitError::Open => BrokerError::Connection("circuit breaker open".to_string()),
        CircuitError::Inner(e) => e,
    }
}

/// Wraps a [`KvClient`] with a [`CircuitBreaker`]. Streaming operations
/// (`subscribe_cancellations`) return the inner subscription directly once
/// established — the breaker only guards the act of establishing it, not
/// every message pulled off it afterward.
pub struct GuardedKv<C: Clock> {
    inner: Arc<dyn KvClient>,
    breaker: CircuitBreaker<C>,
}

impl<C: Clock> GuardedKv<C> {
    pub fn new(inner: Arc<dyn KvClient>, breaker: CircuitBreaker<C>) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &CircuitBreaker<C> {
        &self.breaker
    }
}

#[async_trait]
impl<C: Clock + 'static> KvClient for GuardedKv<C> {
    async fn due_before(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<String>, KvError> {
        self.breaker.call(|| self.inner.due_before(now, limit)).await.map_err(unwrap_kv)
    }

    async fn due_upsert(&self, job_id: &str, execute_at: DateTime<Utc>) -> Result<(), KvError> {
        self.breaker.call(|| self.inner.due_upsert(job_id, execute_at)).await.map_err(unwrap_kv)
    }

    async fn due_remove(&self, job_id: &str) -> Result<(), KvError> {
        self.breaker.call(|| self.inner.due_remove(job_id)).await.map_err(unwrap_kv)
    }

    async fn cache_job(&self, job_id: &str, payload: &str, ttl_seconds: u64) -> Result<(), KvError> {
        self.breaker.call(|| self.inner.cache_job(job_id, payload, ttl_seconds)).await.map_err(unwrap_kv)
    }

    async fn cached_job(&self, job_id: &str) -> Result<Option<String>, KvError> {
        self.breaker.call(|| self.inner.cached_job(job_id)).await.map_err(unwrap_kv)
    }

    async fn evict_job_cache(&self, job_id: &str) -> Result<(), KvError> {
        self.breaker.call(|| self.inner.evict_job_cache(job_id)).await.map_err(unwrap_kv)
    }

    async fn acquire_lock(&self, lock_id: &str, ttl_seconds: u64) -> Result<Option<LockToken>, KvError> {
        self.breaker.call(|| self.inner.acquire_lock(lock_id, ttl_seconds)).await.map_err(unwrap_kv)
    }

    async fn release_lock(&self, lock_id: &str, token: &LockToken) -> Result<(), KvError> {
        self.breaker.call(|| self.inner.release_lock(lock_id, token)).await.map_err(unwrap_kv)
    }

    async fn refresh_lock(&self, lock_id: &str, token: &LockToken, ttl_seconds: u64) -> Result<bool, KvError> {
        self.breaker.call(|| self.inner.refresh_lock(lock_id, token, ttl_seconds)).await.map_err(unwrap_kv)
    }

    async fn is_running(&self, job_id: &str) -> Result<bool, KvError> {
        self.breaker.call(|| self.inner.is_running(job_id)).await.map_err(unwrap_kv)
    }

    async fn mark_running(&self, job_id: &str, occurrence_id: &str, ttl_seconds: u64) -> Result<(), KvError> {
        self.breaker.call(|| self.inner.mark_running(job_id, occurrence_id, ttl_seconds)).await.map_err(unwrap_kv)
    }

    async fn clear_running(&self, job_id: &str) -> Result<(), KvError> {
        self.breaker.call(|| self.inner.clear_running(job_id)).await.map_err(unwrap_kv)
    }

    async fn stale_running(&self, older_than: DateTime<Utc>) -> Result<Vec<(String, String)>, KvError> {
        self.breaker.call(|| self.inner.stale_running(older_than)).await.map_err(unwrap_kv)
    }

    async fn upsert_worker(&self, worker_id: &str, payload: &str) -> Result<(), KvError> {
        self.breaker.call(|| self.inner.upsert_worker(worker_id, payload)).await.map_err(unwrap_kv)
    }

    async fn upsert_worker_instance(
        &self,
        worker_id: &str,
        instance_id: &str,
        payload: &str,
        ttl_seconds: u64,
    ) -> Result<(), KvError> {
        self.breaker
            .call(|| self.inner.upsert_worker_instance(worker_id, instance_id, payload, ttl_seconds))
            .await
            .map_err(unwrap_kv)
    }

    async fn worker_instance_alive(&self, worker_id: &str, instance_id: &str) -> Result<bool, KvError> {
        self.breaker.call(|| self.inner.worker_instance_alive(worker_id, instance_id)).await.map_err(unwrap_kv)
    }

    async fn publish_cancellation(&self, occurrence_id: &str) -> Result<(), KvError> {
        self.breaker.call(|| self.inner.publish_cancellation(occurrence_id)).await.map_err(unwrap_kv)
    }

    async fn subscribe_cancellations(&self) -> Result<Box<dyn CancellationSubscription>, KvError> {
        self.breaker.call(|| self.inner.subscribe_cancellations()).await.map_err(unwrap_kv)
    }

    async fn emergency_stop_set(&self) -> Result<bool, KvError> {
        self.breaker.call(|| self.inner.emergency_stop_set()).await.map_err(unwrap_kv)
    }

    async fn set_emergency_stop(&self, enabled: bool) -> Result<(), KvError> {
        self.breaker.call(|| self.inner.set_emergency_stop(enabled)).await.map_err(unwrap_kv)
    }
}

/// Wraps a [`BrokerClient`] with a [`CircuitBreaker`]. `consume_*` establish
/// a consumer through the breaker but the returned `JobConsumer`/
/// `RawConsumer` itself is unguarded — once a subscription exists, failures
/// pulling from it are the connection's own reconnect logic's problem, not
/// something a single request/response breaker models well.
pub struct GuardedBroker<C: Clock> {
    inner: Arc<dyn BrokerClient>,
    breaker: CircuitBreaker<C>,
}

impl<C: Clock> GuardedBroker<C> {
    pub fn new(inner: Arc<dyn BrokerClient>, breaker: CircuitBreaker<C>) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &CircuitBreaker<C> {
        &self.breaker
    }
}

#[async_trait]
impl<C: Clock + 'static> BrokerClient for GuardedBroker<C> {
    async fn declare_topology(&self) -> Result<(), BrokerError> {
        self.breaker.call(|| self.inner.declare_topology()).await.map_err(unwrap_broker)
    }

    async fn publish_job(&self, routing_key: &str, envelope: &JobMessageEnvelope) -> Result<(), BrokerError> {
        self.breaker.call(|| self.inner.publish_job(routing_key, envelope)).await.map_err(unwrap_broker)
    }

    async fn publish_status_update(&self, envelope: &StatusUpdateEnvelope) -> Result<(), BrokerError> {
        self.breaker.call(|| self.inner.publish_status_update(envelope)).await.map_err(unwrap_broker)
    }

    async fn publish_log(&self, envelope: &LogEnvelope) -> Result<(), BrokerError> {
        self.breaker.call(|| self.inner.publish_log(envelope)).await.map_err(unwrap_broker)
    }

    async fn publish_registration(&self, envelope: &RegistrationEnvelope) -> Result<(), BrokerError> {
        self.breaker.call(|| self.inner.publish_registration(envelope)).await.map_err(unwrap_broker)
    }

    async fn publish_heartbeat(&self, envelope: &HeartbeatEnvelope) -> Result<(), BrokerError> {
        self.breaker.call(|| self.inner.publish_heartbeat(envelope)).await.map_err(unwrap_broker)
    }

    async fn publish_failed_occurrence(&self, failed: &FailedOccurrence) -> Result<(), BrokerError> {
        self.breaker.call(|| self.inner.publish_failed_occurrence(failed)).await.map_err(unwrap_broker)
    }

    async fn queue_message_count(&self, routing_pattern: &str) -> Result<u64, BrokerError> {
        self.breaker.call(|| self.inner.queue_message_count(routing_pattern)).await.map_err(unwrap_broker)
    }

    async fn consume_jobs(&self, routing_pattern: &str, prefetch: u16) -> Result<Box<dyn JobConsumer>, BrokerError> {
        self.breaker.call(|| self.inner.consume_jobs(routing_pattern, prefetch)).await.map_err(unwrap_broker)
    }

    async fn consume_status_updates(&self, prefetch: u16) -> Result<Box<dyn RawConsumer>, BrokerError> {
        self.breaker.call(|| self.inner.consume_status_updates(prefetch)).await.map_err(unwrap_broker)
    }

    async fn consume_logs(&self, prefetch: u16) -> Result<Box<dyn RawConsumer>, BrokerError> {
        self.breaker.call(|| self.inner.consume_logs(prefetch)).await.map_err(unwrap_broker)
    }

    async fn consume_registrations(&self, prefetch: u16) -> Result<Box<dyn RawConsumer>, BrokerError> {
        self.breaker.call(|| self.inner.consume_registrations(prefetch)).await.map_err(unwrap_broker)
    }

    async fn consume_heartbeats(&self, prefetch: u16) -> Result<Box<dyn RawConsumer>, BrokerError> {
        self.breaker.call(|| self.inner.consume_heartbeats(prefetch)).await.map_err(unwrap_broker)
    }

    async fn consume_failed_occurrences(&self, prefetch: u16) -> Result<Box<dyn RawConsumer>, BrokerError> {
        self.breaker.call(|| self.inner.consume_failed_occurrences(prefetch)).await.map_err(unwrap_broker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::FakeBroker;
    use crate::circuit::CircuitBreakerConfig;
    use crate::kv::FakeKv;
    use sched_core::FakeClock;
    use std::time::Duration;

    fn breaker() -> CircuitBreaker<FakeClock> {
        CircuitBreaker::new(
            CircuitBreakerConfig { failure_threshold: 2, window: Duration::from_secs(30), cooldown: Duration::from_secs(10) },
            FakeClock::new(),
        )
    }

    #[tokio::test]
    async fn guarded_kv_passes_through_on_success() {
        let kv = GuardedKv::new(Arc::new(FakeKv::new()), breaker());
        kv.set_emergency_stop(true).await.expect("set");
        assert!(kv.emergency_stop_set().await.expect("get"));
    }

    #[tokio::test]
    async fn guarded_broker_passes_through_on_success() {
        let broker = GuardedBroker::new(Arc::new(FakeBroker::new()), breaker());
        broker.declare_topology().await.expect("declare");
        assert_eq!(broker.queue_message_count("jobs.default").await.expect("count"), 0);
    }
}
