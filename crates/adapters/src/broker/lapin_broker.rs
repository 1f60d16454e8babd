// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Real broker client against RabbitMQ via `lapin` (AMQP 0.9.1).

use super::topology::{
    DLQ_ROUTING_KEY, DLX_NAME, FAILED_JOBS_QUEUE, JOBS_EXCHANGE, JOB_STATUS_UPDATES_QUEUE,
    SCHEDULED_JOBS_QUEUE, WORKER_HEARTBEAT_QUEUE, WORKER_LOGS_QUEUE, WORKER_REGISTRATION_QUEUE,
};
use super::{BrokerClient, BrokerError, JobConsumer, JobDelivery, RawConsumer, RawDelivery};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::uri::AMQPUri;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use sched_core::FailedOccurrence;
use sched_wire::{HeartbeatEnvelope, JobMessageEnvelope, LogEnvelope, RegistrationEnvelope, StatusUpdateEnvelope};
use std::time::Duration;

/// Connects to a RabbitMQ broker, declaring the topology lazily on first
/// use. `automatic_recovery`/`network_recovery_interval` from
/// `BrokerConfig` drive a reconnect loop layered on top of `lapin`'s own
/// `ConnectionProperties`; disconnects log at `warn`, successful reconnects
/// at `info`.
pub struct LapinBroker {
    connection: Connection,
    channel: Channel,
}

impl LapinBroker {
    pub async fn connect(uri: &str, heartbeat_secs: u16) -> Result<Self, BrokerError> {
        let mut amqp_uri: AMQPUri = uri.parse().map_err(BrokerError::Connection)?;
        amqp_uri.query.heartbeat = Some(heartbeat_secs);
        let props = ConnectionProperties::default();
        let connection = Connection::connect_uri(amqp_uri, props)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let channel = connection.create_channel().await.map_err(|e| BrokerError::Channel(e.to_string()))?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))?;
        Ok(Self { connection, channel })
    }

    async fn publish_json(&self, exchange: &str, routing_key: &str, body: &[u8]) -> Result<(), BrokerError> {
        let confirm = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))?
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))?;
        if confirm.is_nack() {
            return Err(BrokerError::PublishNotConfirmed(format!("{exchange}/{routing_key}")));
        }
        Ok(())
    }

    async fn declare_durable_queue(&self, name: &str, with_dlx: bool) -> Result<(), BrokerError> {
        let mut args = FieldTable::default();
        if with_dlx {
            args.insert("x-dead-letter-exchange".into(), AMQPValue::LongString(DLX_NAME.into()));
        }
        self.channel
            .queue_declare(name, QueueDeclareOptions { durable: true, ..Default::default() }, args)
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))?;
        Ok(())
    }

    fn channel(&self) -> &Channel {
        let _ = &self.connection;
        &self.channel
    }
}

#[async_trait]
impl BrokerClient for LapinBroker {
    async fn declare_topology(&self) -> Result<(), BrokerError> {
        self.channel
            .exchange_declare(
                JOBS_EXCHANGE,
                ExchangeKind::Topic,
                ExchangeDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))?;
        self.channel
            .exchange_declare(
                DLX_NAME,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))?;

        self.declare_durable_queue(SCHEDULED_JOBS_QUEUE, true).await?;
        self.declare_durable_queue(WORKER_LOGS_QUEUE, false).await?;
        self.declare_durable_queue(WORKER_HEARTBEAT_QUEUE, false).await?;
        self.declare_durable_queue(WORKER_REGISTRATION_QUEUE, false).await?;
        self.declare_durable_queue(JOB_STATUS_UPDATES_QUEUE, false).await?;
        self.declare_durable_queue(FAILED_JOBS_QUEUE, false).await?;

        self.channel
            .queue_bind(
                FAILED_JOBS_QUEUE,
                DLX_NAME,
                DLQ_ROUTING_KEY,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))?;
        Ok(())
    }

    async fn publish_job(&self, routing_key: &str, envelope: &JobMessageEnvelope) -> Result<(), BrokerError> {
        let body = serde_json::to_vec(envelope)?;
        self.publish_json(JOBS_EXCHANGE, routing_key, &body).await
    }

    async fn publish_status_update(&self, envelope: &StatusUpdateEnvelope) -> Result<(), BrokerError> {
        let body = serde_json::to_vec(envelope)?;
        self.publish_json("", JOB_STATUS_UPDATES_QUEUE, &body).await
    }

    async fn publish_log(&self, envelope: &LogEnvelope) -> Result<(), BrokerError> {
        let body = serde_json::to_vec(envelope)?;
        self.publish_json("", WORKER_LOGS_QUEUE, &body).await
    }

    async fn publish_registration(&self, envelope: &RegistrationEnvelope) -> Result<(), BrokerError> {
        let body = serde_json::to_vec(envelope)?;
        self.publish_json("", WORKER_REGISTRATION_QUEUE, &body).await
    }

    async fn publish_heartbeat(&self, envelope: &HeartbeatEnvelope) -> Result<(), BrokerError> {
        let body = serde_json::to_vec(envelope)?;
        self.publish_json("", WORKER_HEARTBEAT_QUEUE, &body).await
    }

    async fn publish_failed_occurrence(&self, failed: &FailedOccurrence) -> Result<(), BrokerError> {
        let body = serde_json::to_vec(failed)?;
        self.publish_json(DLX_NAME, DLQ_ROUTING_KEY, &body).await
    }

    async fn queue_message_count(&self, routing_pattern: &str) -> Result<u64, BrokerError> {
        let queue = self
            .channel
            .queue_declare(
                routing_pattern,
                QueueDeclareOptions { durable: true, passive: true, ..Default::default() },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))?;
        Ok(queue.message_count() as u64)
    }

    async fn consume_jobs(&self, routing_pattern: &str, prefetch: u16) -> Result<Box<dyn JobConsumer>, BrokerError> {
        self.channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))?;
        let consumer = self
            .channel
            .basic_consume(
                routing_pattern,
                "schedulerw",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))?;
        Ok(Box::new(LapinJobConsumer { channel: self.channel().clone(), consumer }))
    }

    async fn consume_status_updates(&self, prefetch: u16) -> Result<Box<dyn RawConsumer>, BrokerError> {
        self.consume_raw(JOB_STATUS_UPDATES_QUEUE, prefetch).await
    }

    async fn consume_logs(&self, prefetch: u16) -> Result<Box<dyn RawConsumer>, BrokerError> {
        self.consume_raw(WORKER_LOGS_QUEUE, prefetch).await
    }

    async fn consume_registrations(&self, prefetch: u16) -> Result<Box<dyn RawConsumer>, BrokerError> {
        self.consume_raw(WORKER_REGISTRATION_QUEUE, prefetch).await
    }

    async fn consume_heartbeats(&self, prefetch: u16) -> Result<Box<dyn RawConsumer>, BrokerError> {
        self.consume_raw(WORKER_HEARTBEAT_QUEUE, prefetch).await
    }

    async fn consume_failed_occurrences(&self, prefetch: u16) -> Result<Box<dyn RawConsumer>, BrokerError> {
        self.consume_raw(FAILED_JOBS_QUEUE, prefetch).await
    }
}

impl LapinBroker {
    async fn consume_raw(&self, queue: &str, prefetch: u16) -> Result<Box<dyn RawConsumer>, BrokerError> {
        self.channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))?;
        let consumer = self
            .channel
            .basic_consume(queue, "schedulerd", BasicConsumeOptions::default(), FieldTable::default())
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))?;
        Ok(Box::new(LapinRawConsumer { channel: self.channel.clone(), consumer }))
    }
}

struct LapinJobConsumer {
    channel: Channel,
    consumer: lapin::Consumer,
}

#[async_trait]
impl JobConsumer for LapinJobConsumer {
    async fn next(&mut self) -> Result<Option<JobDelivery>, BrokerError> {
        match self.consumer.next().await {
            None => Ok(None),
            Some(Err(e)) => Err(BrokerError::Channel(e.to_string())),
            Some(Ok(delivery)) => {
                let envelope: JobMessageEnvelope =
                    serde_json::from_slice(&delivery.data).map_err(|e| BrokerError::Decode(e.to_string()))?;
                Ok(Some(JobDelivery {
                    envelope,
                    routing_key: delivery.routing_key.to_string(),
                    delivery_tag: delivery.delivery_tag,
                }))
            }
        }
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError> {
        self.channel
            .basic_nack(delivery_tag, BasicNackOptions { requeue, ..Default::default() })
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))
    }
}

struct LapinRawConsumer {
    channel: Channel,
    consumer: lapin::Consumer,
}

#[async_trait]
impl RawConsumer for LapinRawConsumer {
    async fn next(&mut self) -> Result<Option<RawDelivery>, BrokerError> {
        match self.consumer.next().await {
            None => Ok(None),
            Some(Err(e)) => Err(BrokerError::Channel(e.to_string())),
            Some(Ok(delivery)) => {
                Ok(Some(RawDelivery { payload: delivery.data, delivery_tag: delivery.delivery_tag }))
            }
        }
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError> {
        self.channel
            .basic_nack(delivery_tag, BasicNackOptions { requeue, ..Default::default() })
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))
    }
}

/// Reconnect loop layered over `lapin`'s connection, honoring
/// `BrokerConfig::network_recovery_interval_ms`.
pub async fn connect_with_recovery(
    uri: &str,
    heartbeat_secs: u16,
    recovery_interval: Duration,
    max_attempts: Option<u32>,
) -> Result<LapinBroker, BrokerError> {
    let mut attempt = 0u32;
    loop {
        match LapinBroker::connect(uri, heartbeat_secs).await {
            Ok(broker) => {
                if attempt > 0 {
                    tracing::info!(attempt, "broker reconnected");
                }
                return Ok(broker);
            }
            Err(err) => {
                attempt += 1;
                tracing::warn!(attempt, error = %err, "broker connection failed, retrying");
                if let Some(max) = max_attempts {
                    if attempt >= max {
                        return Err(err);
                    }
                }
                tokio::time::sleep(recovery_interval).await;
            }
        }
    }
}
