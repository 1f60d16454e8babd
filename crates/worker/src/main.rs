// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `schedulerw`: the worker process. Connects to
//! the same broker/KV topology as `schedulerd`, registers its handlers,
//! consumes `scheduled_jobs_queue`, and keeps the scheduler informed via
//! periodic heartbeats while a local outbox absorbs any broker hiccup.

use sched_adapters::broker::{LapinBroker, SCHEDULED_JOBS_QUEUE};
use sched_adapters::kv::RedisKv;
use sched_adapters::{CircuitBreaker, CircuitBreakerConfig, GuardedBroker, GuardedKv};
use sched_core::config::{Config, ConfigError};
use sched_core::{HandlerDescriptor, InstanceId, SystemClock, WorkerId, WorkerStatus};
use sched_wire::{HeartbeatEnvelope, JobHeartbeat, RegistrationEnvelope};
use sched_worker::{CancellationRegistry, ConsumerRuntime, HandlerRegistry, Outbox, RunningJobs, RuntimeConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const REGISTRATION_VERSION: u32 = 1;

/// Exits 2 when the config file exists but fails validation; a missing or
/// unparseable file falls back to defaults, matching the prior behavior for
/// a first run with no config file present.
fn load_config() -> Config {
    let path = std::env::args().nth(1).unwrap_or_else(|| "schedulerw.toml".to_string());
    match Config::load(std::path::Path::new(&path)) {
        Ok(config) => config,
        Err(ConfigError::Invalid(reason)) => {
            error!(path, reason, "configuration is invalid, refusing to start");
            std::process::exit(2);
        }
        Err(err) => {
            warn!(error = %err, path, "failed to load config file, falling back to defaults");
            Config::default()
        }
    }
}

fn build_handlers() -> HandlerRegistry {
    let mut handlers = HandlerRegistry::new();
    handlers.register("noop", sched_worker::handlers::built_in::NoopHandler);
    handlers
}

fn handler_descriptors(handlers: &HandlerRegistry, max_parallel_jobs: u32, execution_timeout_seconds: i64) -> Vec<HandlerDescriptor> {
    handlers
        .names()
        .map(|name| HandlerDescriptor {
            name: name.to_string(),
            routing_pattern: name.to_string(),
            max_parallel_jobs,
            execution_timeout_seconds: Some(execution_timeout_seconds),
            job_data_schema: None,
        })
        .collect()
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let config = load_config();

    let worker_id = WorkerId::from_string(&config.worker.worker_id);
    let instance_id = InstanceId::new();

    let broker_url = config
        .broker
        .url_override
        .clone()
        .unwrap_or_else(|| format!("amqp://{}:{}{}", config.broker.host, config.broker.port, config.broker.vhost));
    let inner_broker = match LapinBroker::connect(&broker_url, config.broker.heartbeat_seconds).await {
        Ok(broker) => broker,
        Err(err) => {
            error!(error = %err, "failed to connect to broker at startup");
            std::process::exit(1);
        }
    };
    let inner_kv = match RedisKv::connect(&config.kv.connection_string, config.kv.key_prefix.clone()).await {
        Ok(kv) => kv,
        Err(err) => {
            error!(error = %err, "failed to connect to kv store at startup");
            std::process::exit(1);
        }
    };

    let breaker_config = CircuitBreakerConfig::default();
    let broker: Arc<dyn sched_adapters::BrokerClient> =
        Arc::new(GuardedBroker::new(Arc::new(inner_broker), CircuitBreaker::new(breaker_config, SystemClock)));
    let kv: Arc<dyn sched_adapters::KvClient> = Arc::new(GuardedKv::new(Arc::new(inner_kv), CircuitBreaker::new(breaker_config, SystemClock)));

    if let Err(err) = broker.declare_topology().await {
        error!(error = %err, "failed to declare broker topology at startup");
        std::process::exit(1);
    }

    let outbox = Arc::new(Outbox::open(&config.worker.offline_resilience.local_storage_path).expect("open worker outbox"));
    let handlers = Arc::new(build_handlers());
    let cancellations = CancellationRegistry::new();
    let running = RunningJobs::new();

    let mut handler_timeout_overrides = HashMap::new();
    for handler in &config.handlers {
        handler_timeout_overrides.insert(handler.consumer_id.clone(), handler.execution_timeout_seconds);
    }

    let registration = RegistrationEnvelope {
        worker_id,
        instance_id,
        handlers: handler_descriptors(&handlers, config.worker.max_parallel_jobs, config.worker.execution_timeout_seconds),
        version: REGISTRATION_VERSION,
        metadata: HashMap::new(),
    };
    if let Err(err) = broker.publish_registration(&registration).await {
        warn!(error = %err, "failed to publish worker registration");
    }

    let runtime_config = RuntimeConfig {
        worker_id,
        max_parallel_jobs: config.worker.max_parallel_jobs,
        default_execution_timeout_seconds: config.worker.execution_timeout_seconds,
        handler_timeout_overrides,
    };
    let runtime = ConsumerRuntime::new(runtime_config, handlers, broker.clone(), outbox.clone(), cancellations.clone(), running.clone());

    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    tasks.push(spawn_consumer(runtime, broker.clone(), config.worker.max_parallel_jobs, cancel.clone()));
    tasks.push(spawn_heartbeat_sender(broker.clone(), worker_id, instance_id, config.worker.max_parallel_jobs, config.worker.heartbeat.clone(), running, cancel.clone()));
    tasks.push(spawn_cancellation_listener(kv.clone(), cancellations, cancel.clone()));
    tasks.push(spawn_outbox_sync(broker.clone(), outbox.clone(), config.worker.offline_resilience.clone(), cancel.clone()));
    tasks.push(spawn_outbox_cleanup(outbox.clone(), config.worker.offline_resilience.clone(), cancel.clone()));

    tokio::signal::ctrl_c().await.expect("listen for ctrl-c");
    info!("shutdown signal received, stopping background tasks");
    cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }

    final_flush(broker.as_ref(), outbox.as_ref(), &config.worker.offline_resilience).await;
}

fn spawn_consumer(runtime: ConsumerRuntime, broker: Arc<dyn sched_adapters::BrokerClient>, max_parallel_jobs: u32, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let consumer = match broker.consume_jobs(SCHEDULED_JOBS_QUEUE, max_parallel_jobs.max(1) as u16).await {
            Ok(consumer) => consumer,
            Err(err) => {
                error!(error = %err, "failed to open job consumer");
                return;
            }
        };
        runtime.run(consumer, cancel).await;
    })
}

fn spawn_heartbeat_sender(
    broker: Arc<dyn sched_adapters::BrokerClient>,
    worker_id: WorkerId,
    instance_id: InstanceId,
    max_parallel_jobs: u32,
    config: sched_core::config::HeartbeatConfig,
    running: RunningJobs,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !config.enabled {
            return;
        }
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(config.interval_seconds));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let envelope = HeartbeatEnvelope {
                        worker_id,
                        instance_id,
                        current_jobs: 0,
                        max_parallel_jobs,
                        status: WorkerStatus::Shutdown,
                        jobs: Vec::new(),
                    };
                    let _ = broker.publish_heartbeat(&envelope).await;
                    return;
                }
                _ = interval.tick() => {
                    let occurrences = running.snapshot();
                    let now = chrono::Utc::now();
                    let envelope = HeartbeatEnvelope {
                        worker_id,
                        instance_id,
                        current_jobs: occurrences.len() as u32,
                        max_parallel_jobs,
                        status: WorkerStatus::Active,
                        jobs: occurrences.into_iter().map(|correlation_id| JobHeartbeat { correlation_id, last_heartbeat: now }).collect(),
                    };
                    if let Err(err) = broker.publish_heartbeat(&envelope).await {
                        warn!(error = %err, "failed to publish worker heartbeat");
                    }
                }
            }
        }
    })
}

fn spawn_cancellation_listener(kv: Arc<dyn sched_adapters::KvClient>, registry: CancellationRegistry, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        sched_worker::cancellation::run(kv.as_ref(), registry, cancel).await;
    })
}

fn spawn_outbox_sync(
    broker: Arc<dyn sched_adapters::BrokerClient>,
    outbox: Arc<Outbox>,
    config: sched_core::config::OfflineResilienceConfig,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !config.enabled {
            return;
        }
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(config.sync_interval_seconds));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {
                    match outbox.sync(broker.as_ref(), 100, config.max_sync_retries).await {
                        Ok(report) if report.status_updates_flushed > 0 || report.logs_flushed > 0 => {
                            info!(
                                status_updates = report.status_updates_flushed,
                                logs = report.logs_flushed,
                                status_updates_dropped = report.status_updates_dropped,
                                logs_dropped = report.logs_dropped,
                                "outbox sync flushed pending records"
                            );
                        }
                        Ok(_) => {}
                        Err(err) => warn!(error = %err, "outbox sync failed"),
                    }
                }
            }
        }
    })
}

fn spawn_outbox_cleanup(outbox: Arc<Outbox>, config: sched_core::config::OfflineResilienceConfig, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !config.enabled {
            return;
        }
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(config.cleanup_interval_hours * 3600));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {
                    match outbox.cleanup(chrono::Duration::days(config.record_retention_days as i64)) {
                        Ok(deleted) if deleted > 0 => info!(deleted, "outbox cleanup removed retained records"),
                        Ok(_) => {}
                        Err(err) => warn!(error = %err, "outbox cleanup failed"),
                    }
                }
            }
        }
    })
}

/// Shutdown-time final flush with a reduced retry budget: gives
/// up on a stuck record much sooner than the steady-state syncer would, so
/// the process doesn't hang waiting on a broker that isn't coming back.
async fn final_flush(broker: &dyn sched_adapters::BrokerClient, outbox: &Outbox, config: &sched_core::config::OfflineResilienceConfig) {
    if !config.enabled {
        return;
    }
    let reduced_retries = config.max_sync_retries.min(1).max(1);
    match outbox.sync(broker, 1000, reduced_retries).await {
        Ok(report) => info!(
            status_updates = report.status_updates_flushed,
            logs = report.logs_flushed,
            "final outbox flush on shutdown"
        ),
        Err(err) => error!(error = %err, "final outbox flush failed"),
    }
}
