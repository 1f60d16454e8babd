// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker client: topic exchange `jobs.topic`, a dead-letter
//! exchange `dlx_scheduled_jobs`, six durable queues, manual ack, publisher
//! confirms. `BrokerClient` is the trait both sides program against; the
//! scheduler publishes job messages and consumes status/log/registration/
//! heartbeat/failed-occurrence queues, the worker publishes those same
//! queues and consumes jobs.

#[cfg(any(test, feature = "test-support"))]
mod fake;
mod lapin_broker;
mod topology;

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeBroker;
pub use lapin_broker::LapinBroker;
pub use topology::{
    DLQ_ROUTING_KEY, DLX_NAME, FAILED_JOBS_QUEUE, JOBS_EXCHANGE, JOB_STATUS_UPDATES_QUEUE,
    SCHEDULED_JOBS_QUEUE, WORKER_HEARTBEAT_QUEUE, WORKER_LOGS_QUEUE, WORKER_REGISTRATION_QUEUE,
};

use async_trait::async_trait;
use sched_core::FailedOccurrence;
use sched_wire::{HeartbeatEnvelope, JobMessageEnvelope, LogEnvelope, RegistrationEnvelope, StatusUpdateEnvelope};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connection error: {0}")]
    Connection(String),
    #[error("broker publish was not confirmed: {0}")]
    PublishNotConfirmed(String),
    #[error("broker channel error: {0}")]
    Channel(String),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to decode message: {0}")]
    Decode(String),
}

/// One delivery pulled off a job queue, still unacknowledged.
pub struct JobDelivery {
    pub envelope: JobMessageEnvelope,
    pub routing_key: String,
    pub delivery_tag: u64,
}

/// A bounded, prefetch-limited stream of job deliveries plus manual ack/nack:
/// always ack the broker message on success, and do not nack unless the
/// process is shutting down.
#[async_trait]
pub trait JobConsumer: Send {
    async fn next(&mut self) -> Result<Option<JobDelivery>, BrokerError>;
    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError>;
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError>;
}

/// A bounded stream of raw JSON payloads, used for the worker-log /
/// heartbeat / registration / status-update / failed-occurrence queues
/// where the consumer acks immediately after successful application.
pub struct RawDelivery {
    pub payload: Vec<u8>,
    pub delivery_tag: u64,
}

#[async_trait]
pub trait RawConsumer: Send {
    async fn next(&mut self) -> Result<Option<RawDelivery>, BrokerError>;
    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError>;
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError>;
}

/// Everything both the scheduler and the worker need from the broker. A
/// single trait rather than a scheduler-side/worker-side split because both
/// sides publish AND consume different queues of the same topology;
/// callers just ignore the methods they don't use.
#[async_trait]
pub trait BrokerClient: Send + Sync + 'static {
    /// Declare the full topology (exchanges, DLX, queues, bindings). Safe to
    /// call repeatedly; AMQP `queue_declare`/`exchange_declare` are already
    /// idempotent.
    async fn declare_topology(&self) -> Result<(), BrokerError>;

    async fn publish_job(&self, routing_key: &str, envelope: &JobMessageEnvelope) -> Result<(), BrokerError>;
    async fn publish_status_update(&self, envelope: &StatusUpdateEnvelope) -> Result<(), BrokerError>;
    async fn publish_log(&self, envelope: &LogEnvelope) -> Result<(), BrokerError>;
    async fn publish_registration(&self, envelope: &RegistrationEnvelope) -> Result<(), BrokerError>;
    async fn publish_heartbeat(&self, envelope: &HeartbeatEnvelope) -> Result<(), BrokerError>;
    async fn publish_failed_occurrence(&self, failed: &FailedOccurrence) -> Result<(), BrokerError>;

    /// Best-effort queue depth without binding a consumer.
    async fn queue_message_count(&self, routing_pattern: &str) -> Result<u64, BrokerError>;

    async fn consume_jobs(&self, routing_pattern: &str, prefetch: u16) -> Result<Box<dyn JobConsumer>, BrokerError>;
    async fn consume_status_updates(&self, prefetch: u16) -> Result<Box<dyn RawConsumer>, BrokerError>;
    async fn consume_logs(&self, prefetch: u16) -> Result<Box<dyn RawConsumer>, BrokerError>;
    async fn consume_registrations(&self, prefetch: u16) -> Result<Box<dyn RawConsumer>, BrokerError>;
    async fn consume_heartbeats(&self, prefetch: u16) -> Result<Box<dyn RawConsumer>, BrokerError>;
    async fn consume_failed_occurrences(&self, prefetch: u16) -> Result<Box<dyn RawConsumer>, BrokerError>;
}
