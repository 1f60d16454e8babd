// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory broker fake: tests drive the same `BrokerClient` trait the
//! real `LapinBroker` implements, with plain `VecDeque`s standing in for
//! AMQP queues.

use super::{BrokerClient, BrokerError, JobConsumer, JobDelivery, RawConsumer, RawDelivery};
use async_trait::async_trait;
use parking_lot::Mutex;
use sched_core::FailedOccurrence;
use sched_wire::{HeartbeatEnvelope, JobMessageEnvelope, LogEnvelope, RegistrationEnvelope, StatusUpdateEnvelope};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct State {
    /// routing_pattern -> pending job deliveries
    job_queues: HashMap<String, VecDeque<JobMessageEnvelope>>,
    status_updates: VecDeque<Vec<u8>>,
    logs: VecDeque<Vec<u8>>,
    registrations: VecDeque<Vec<u8>>,
    heartbeats: VecDeque<Vec<u8>>,
    failed_occurrences: VecDeque<Vec<u8>>,
    /// Publishes that should fail, by exact match on (exchange-ish target).
    fail_next_job_publish: bool,
}

/// In-memory stand-in for [`super::LapinBroker`], used in scheduler/worker
/// unit and integration tests (`test-support` feature).
#[derive(Clone, Default)]
pub struct FakeBroker {
    state: Arc<Mutex<State>>,
    delivery_tags: Arc<AtomicU64>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `publish_job` call fail, to exercise the dispatcher's
    /// broker-failure-then-retry path.
    pub fn fail_next_job_publish(&self) {
        self.state.lock().fail_next_job_publish = true;
    }

    /// Number of envelopes still queued under `routing_pattern`.
    pub fn job_queue_depth(&self, routing_pattern: &str) -> usize {
        self.state.lock().job_queues.get(routing_pattern).map(VecDeque::len).unwrap_or(0)
    }
}

#[async_trait]
impl BrokerClient for FakeBroker {
    async fn declare_topology(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn publish_job(&self, routing_key: &str, envelope: &JobMessageEnvelope) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        if state.fail_next_job_publish {
            state.fail_next_job_publish = false;
            return Err(BrokerError::PublishNotConfirmed(routing_key.to_string()));
        }
        state.job_queues.entry(routing_key.to_string()).or_default().push_back(envelope.clone());
        Ok(())
    }

    async fn publish_status_update(&self, envelope: &StatusUpdateEnvelope) -> Result<(), BrokerError> {
        self.state.lock().status_updates.push_back(serde_json::to_vec(envelope)?);
        Ok(())
    }

    async fn publish_log(&self, envelope: &LogEnvelope) -> Result<(), BrokerError> {
        self.state.lock().logs.push_back(serde_json::to_vec(envelope)?);
        Ok(())
    }

    async fn publish_registration(&self, envelope: &RegistrationEnvelope) -> Result<(), BrokerError> {
        self.state.lock().registrations.push_back(serde_json::to_vec(envelope)?);
        Ok(())
    }

    async fn publish_heartbeat(&self, envelope: &HeartbeatEnvelope) -> Result<(), BrokerError> {
        self.state.lock().heartbeats.push_back(serde_json::to_vec(envelope)?);
        Ok(())
    }

    async fn publish_failed_occurrence(&self, failed: &FailedOccurrence) -> Result<(), BrokerError> {
        self.state.lock().failed_occurrences.push_back(serde_json::to_vec(failed)?);
        Ok(())
    }

    async fn queue_message_count(&self, routing_pattern: &str) -> Result<u64, BrokerError> {
        Ok(self.job_queue_depth(routing_pattern) as u64)
    }

    async fn consume_jobs(&self, routing_pattern: &str, _prefetch: u16) -> Result<Box<dyn JobConsumer>, BrokerError> {
        Ok(Box::new(FakeJobConsumer {
            state: self.state.clone(),
            routing_pattern: routing_pattern.to_string(),
            tags: self.delivery_tags.clone(),
        }))
    }

    async fn consume_status_updates(&self, _prefetch: u16) -> Result<Box<dyn RawConsumer>, BrokerError> {
        Ok(Box::new(FakeRawConsumer {
            state: self.state.clone(),
            select: |s| &mut s.status_updates,
            tags: self.delivery_tags.clone(),
        }))
    }

    async fn consume_logs(&self, _prefetch: u16) -> Result<Box<dyn RawConsumer>, BrokerError> {
        Ok(Box::new(FakeRawConsumer { state: self.state.clone(), select: |s| &mut s.logs, tags: self.delivery_tags.clone() }))
    }

    async fn consume_registrations(&self, _prefetch: u16) -> Result<Box<dyn RawConsumer>, BrokerError> {
        Ok(Box::new(FakeRawConsumer {
            state: self.state.clone(),
            select: |s| &mut s.registrations,
            tags: self.delivery_tags.clone(),
        }))
    }

    async fn consume_heartbeats(&self, _prefetch: u16) -> Result<Box<dyn RawConsumer>, BrokerError> {
        Ok(Box::new(FakeRawConsumer {
            state: self.state.clone(),
            select: |s| &mut s.heartbeats,
            tags: self.delivery_tags.clone(),
        }))
    }

    async fn consume_failed_occurrences(&self, _prefetch: u16) -> Result<Box<dyn RawConsumer>, BrokerError> {
        Ok(Box::new(FakeRawConsumer {
            state: self.state.clone(),
            select: |s| &mut s.failed_occurrences,
            tags: self.delivery_tags.clone(),
        }))
    }
}

struct FakeJobConsumer {
    state: Arc<Mutex<State>>,
    routing_pattern: String,
    tags: Arc<AtomicU64>,
}

#[async_trait]
impl JobConsumer for FakeJobConsumer {
    async fn next(&mut self) -> Result<Option<JobDelivery>, BrokerError> {
        let mut state = self.state.lock();
        let envelope = state.job_queues.get_mut(&self.routing_pattern).and_then(VecDeque::pop_front);
        Ok(envelope.map(|envelope| JobDelivery {
            envelope,
            routing_key: self.routing_pattern.clone(),
            delivery_tag: self.tags.fetch_add(1, Ordering::Relaxed),
        }))
    }

    async fn ack(&self, _delivery_tag: u64) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError> {
        let _ = delivery_tag;
        let _ = requeue;
        Ok(())
    }
}

struct FakeRawConsumer {
    state: Arc<Mutex<State>>,
    select: fn(&mut State) -> &mut VecDeque<Vec<u8>>,
    tags: Arc<AtomicU64>,
}

#[async_trait]
impl RawConsumer for FakeRawConsumer {
    async fn next(&mut self) -> Result<Option<RawDelivery>, BrokerError> {
        let mut state = self.state.lock();
        let payload = (self.select)(&mut state).pop_front();
        Ok(payload.map(|payload| RawDelivery { payload, delivery_tag: self.tags.fetch_add(1, Ordering::Relaxed) }))
    }

    async fn ack(&self, _delivery_tag: u64) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn nack(&self, _delivery_tag: u64, _requeue: bool) -> Result<(), BrokerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sched_core::{JobId, OccurrenceId};
    use chrono::Utc;

    fn sample_job() -> JobMessageEnvelope {
        JobMessageEnvelope {
            job_id: JobId::new(),
            correlation_id: OccurrenceId::new(),
            job_name: "noop".to_string(),
            job_data: String::new(),
            job_version: 1,
            execution_timeout_seconds: None,
            zombie_timeout_minutes: None,
            published_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn published_job_is_consumed_in_order() {
        let broker = FakeBroker::new();
        let first = sample_job();
        let second = sample_job();
        broker.publish_job("jobs.default", &first).await.expect("publish");
        broker.publish_job("jobs.default", &second).await.expect("publish");

        let mut consumer = broker.consume_jobs("jobs.default", 10).await.expect("consume");
        let delivery = consumer.next().await.expect("next").expect("some");
        assert_eq!(delivery.envelope.correlation_id, first.correlation_id);
        let delivery = consumer.next().await.expect("next").expect("some");
        assert_eq!(delivery.envelope.correlation_id, second.correlation_id);
        assert!(consumer.next().await.expect("next").is_none());
    }

    #[tokio::test]
    async fn fail_next_job_publish_rejects_exactly_one_publish() {
        let broker = FakeBroker::new();
        broker.fail_next_job_publish();
        let result = broker.publish_job("jobs.default", &sample_job()).await;
        assert!(result.is_err());

        let result = broker.publish_job("jobs.default", &sample_job()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn queue_message_count_reflects_pending_depth() {
        let broker = FakeBroker::new();
        broker.publish_job("jobs.default", &sample_job()).await.expect("publish");
        broker.publish_job("jobs.default", &sample_job()).await.expect("publish");
        assert_eq!(broker.queue_message_count("jobs.default").await.expect("count"), 2);
    }
}
