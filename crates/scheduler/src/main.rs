// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `schedulerd`: wires storage, adapters, and the dispatch/lifecycle
//! machinery together behind the background task set described in spec
//! §4 and §6 — one dispatcher tick loop, four broker consumer loops
//! (status updates, logs, registrations, heartbeats), and a zombie sweep
//! timer, all stopping together on SIGINT/SIGTERM.

use sched_adapters::broker::LapinBroker;
use sched_adapters::kv::RedisKv;
use sched_adapters::{CircuitBreaker, CircuitBreakerConfig, GuardedBroker, GuardedKv};
use sched_core::config::{Config, ConfigError};
use sched_core::{RetryPolicy, SystemClock};
use sched_scheduler::dispatcher::{Dispatcher, DispatcherConfig as TickConfig};
use sched_scheduler::{
    AutoDisableController, LoggingNotificationSink, NotificationSink, OccurrenceLifecycle,
    RetryPolicies, SchedulerEngine, WorkerRegistry, ZombieDetector,
};
use sched_storage::{snapshot, MaterializedState, Wal};
use sched_wire::{HeartbeatEnvelope, LogEnvelope, RegistrationEnvelope, StatusUpdateEnvelope};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const WAL_PATH: &str = "scheduler.wal.ndjson";
const SNAPSHOT_PATH: &str = "scheduler.snapshot.zst";

/// Exits 2 when the config file exists but fails validation; a missing or
/// unparseable file falls back to defaults, matching the prior behavior for
/// a first run with no config file present.
fn load_config() -> Config {
    let path = std::env::args().nth(1).unwrap_or_else(|| "schedulerd.toml".to_string());
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

/// Loads the last snapshot (if any) and replays WAL entries written after
/// it, folding each one directly into the returned state without going
/// back through `SchedulerEngine::apply` (which would re-append them).
fn recover_state() -> (MaterializedState, Wal) {
    let loaded = snapshot::load(SNAPSHOT_PATH).unwrap_or_else(|err| {
        error!(error = %err, "failed to load snapshot, starting from an empty state");
        None
    });
    let (mut state, up_to_seq) = match loaded {
        Some(snap) => (snap.state, snap.up_to_seq),
        None => (MaterializedState::default(), 0),
    };

    let mut wal = Wal::open(WAL_PATH, up_to_seq).expect("open write-ahead log");
    let replayed = wal.entries_after(up_to_seq).expect("read unreplayed wal entries");
    for entry in &replayed {
        state.apply_event(&entry.event);
        wal.mark_processed(entry.seq);
    }
    info!(replayed = replayed.len(), up_to_seq, "recovered scheduler state");
    (state, wal)
}

fn retry_policies(config: &Config) -> RetryPolicies {
    let mut policies = RetryPolicies::new(RetryPolicy::new(3, 5));
    for handler in &config.handlers {
        policies.insert(
            handler.consumer_id.clone(),
            RetryPolicy::new(handler.max_retries, handler.base_retry_delay_seconds),
        );
    }
    policies
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let config = load_config();

    let (state, wal) = recover_state();
    let engine = Arc::new(SchedulerEngine::new(wal, state));

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
    let broker: Arc<dyn sched_adapters::BrokerClient> = Arc::new(GuardedBroker::new(
        Arc::new(inner_broker),
        CircuitBreaker::new(breaker_config, SystemClock),
    ));
    let kv: Arc<dyn sched_adapters::KvClient> = Arc::new(GuardedKv::new(
        Arc::new(inner_kv),
        CircuitBreaker::new(breaker_config, SystemClock),
    ));

    if let Err(err) = broker.declare_topology().await {
        error!(error = %err, "failed to declare broker topology at startup");
        std::process::exit(1);
    }

    let notify: Arc<dyn NotificationSink> = Arc::new(LoggingNotificationSink);
    let retry_policies = retry_policies(&config);
    let auto_disable = Arc::new(AutoDisableController::new(
        config.auto_disable.enabled,
        config.auto_disable.consecutive_failure_threshold,
    ));
    let lifecycle = Arc::new(OccurrenceLifecycle::new(retry_policies.clone()));
    let registry = Arc::new(WorkerRegistry::new(config.kv.default_lock_ttl_seconds));
    let heartbeat_threshold_seconds = config.worker.heartbeat.job_heartbeat_interval_seconds * 3;
    let zombie_detector = Arc::new(ZombieDetector::new(10, heartbeat_threshold_seconds));

    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    if config.dispatcher.enabled {
        let dispatcher = Dispatcher::new(
            TickConfig {
                batch_size: config.dispatcher.batch_size as usize,
                poll_interval: std::time::Duration::from_secs(config.dispatcher.polling_interval_seconds),
                job_lock_ttl_seconds: config.dispatcher.lock_ttl_seconds,
                leader_lock_ttl_seconds: config.dispatcher.lock_ttl_seconds,
                running_ttl_slack_seconds: 60,
                default_execution_timeout_seconds: config.worker.execution_timeout_seconds,
            },
            retry_policies,
        );
        let (engine, broker, kv, notify, cancel) =
            (engine.clone(), broker.clone(), kv.clone(), notify.clone(), cancel.clone());
        tasks.push(tokio::spawn(async move {
            dispatcher.run(engine, kv, broker, notify, cancel).await;
        }));
    }

    tasks.push(spawn_status_update_consumer(engine.clone(), broker.clone(), kv.clone(), auto_disable.clone(), notify.clone(), lifecycle.clone(), cancel.clone()));
    tasks.push(spawn_log_consumer(engine.clone(), broker.clone(), lifecycle.clone(), cancel.clone()));
    tasks.push(spawn_registration_consumer(engine.clone(), broker.clone(), kv.clone(), registry.clone(), cancel.clone()));
    tasks.push(spawn_heartbeat_consumer(engine.clone(), broker.clone(), kv.clone(), registry.clone(), cancel.clone()));
    tasks.push(spawn_zombie_sweep(engine.clone(), broker.clone(), kv.clone(), auto_disable.clone(), notify.clone(), zombie_detector, cancel.clone()));

    tokio::signal::ctrl_c().await.expect("listen for ctrl-c");
    info!("shutdown signal received, stopping background tasks");
    cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }
}

fn spawn_status_update_consumer(
    engine: Arc<SchedulerEngine>,
    broker: Arc<dyn sched_adapters::BrokerClient>,
    kv: Arc<dyn sched_adapters::KvClient>,
    auto_disable: Arc<AutoDisableController>,
    notify: Arc<dyn NotificationSink>,
    lifecycle: Arc<OccurrenceLifecycle>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut consumer = match broker.consume_status_updates(32).await {
            Ok(c) => c,
            Err(err) => {
                error!(error = %err, "failed to open status update consumer");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                delivery = consumer.next() => {
                    let Ok(Some(delivery)) = delivery else { continue };
                    match serde_json::from_slice::<StatusUpdateEnvelope>(&delivery.payload) {
                        Ok(envelope) => {
                            if let Err(err) = lifecycle
                                .apply_status_update(&engine, &kv, &broker, &auto_disable, notify.as_ref(), &envelope)
                                .await
                            {
                                warn!(error = %err, "failed to apply status update");
                            }
                            let _ = consumer.ack(delivery.delivery_tag).await;
                        }
                        Err(err) => {
                            warn!(error = %err, "dropping unparseable status update envelope");
                            let _ = consumer.ack(delivery.delivery_tag).await;
                        }
                    }
                }
            }
        }
    })
}

fn spawn_log_consumer(
    engine: Arc<SchedulerEngine>,
    broker: Arc<dyn sched_adapters::BrokerClient>,
    lifecycle: Arc<OccurrenceLifecycle>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut consumer = match broker.consume_logs(32).await {
            Ok(c) => c,
            Err(err) => {
                error!(error = %err, "failed to open log consumer");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                delivery = consumer.next() => {
                    let Ok(Some(delivery)) = delivery else { continue };
                    match serde_json::from_slice::<LogEnvelope>(&delivery.payload) {
                        Ok(envelope) => {
                            if let Err(err) = lifecycle.apply_log(&engine, &envelope) {
                                warn!(error = %err, "failed to append worker log");
                            }
                            let _ = consumer.ack(delivery.delivery_tag).await;
                        }
                        Err(err) => {
                            warn!(error = %err, "dropping unparseable log envelope");
                            let _ = consumer.ack(delivery.delivery_tag).await;
                        }
                    }
                }
            }
        }
    })
}

fn spawn_registration_consumer(
    engine: Arc<SchedulerEngine>,
    broker: Arc<dyn sched_adapters::BrokerClient>,
    kv: Arc<dyn sched_adapters::KvClient>,
    registry: Arc<WorkerRegistry>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut consumer = match broker.consume_registrations(32).await {
            Ok(c) => c,
            Err(err) => {
                error!(error = %err, "failed to open registration consumer");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                delivery = consumer.next() => {
                    let Ok(Some(delivery)) = delivery else { continue };
                    match serde_json::from_slice::<RegistrationEnvelope>(&delivery.payload) {
                        Ok(envelope) => {
                            if let Err(err) = registry.handle_registration(&engine, kv.as_ref(), &envelope, chrono::Utc::now()).await {
                                warn!(error = %err, "failed to apply worker registration");
                            }
                            let _ = consumer.ack(delivery.delivery_tag).await;
                        }
                        Err(err) => {
                            warn!(error = %err, "dropping unparseable registration envelope");
                            let _ = consumer.ack(delivery.delivery_tag).await;
                        }
                    }
                }
            }
        }
    })
}

fn spawn_heartbeat_consumer(
    engine: Arc<SchedulerEngine>,
    broker: Arc<dyn sched_adapters::BrokerClient>,
    kv: Arc<dyn sched_adapters::KvClient>,
    registry: Arc<WorkerRegistry>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut consumer = match broker.consume_heartbeats(32).await {
            Ok(c) => c,
            Err(err) => {
                error!(error = %err, "failed to open heartbeat consumer");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                delivery = consumer.next() => {
                    let Ok(Some(delivery)) = delivery else { continue };
                    match serde_json::from_slice::<HeartbeatEnvelope>(&delivery.payload) {
                        Ok(envelope) => {
                            let result = if envelope.status == sched_core::WorkerStatus::Shutdown {
                                registry.handle_shutdown(&engine, envelope.worker_id, envelope.instance_id)
                            } else {
                                registry.handle_heartbeat(&engine, kv.as_ref(), &envelope, chrono::Utc::now()).await
                            };
                            if let Err(err) = result {
                                warn!(error = %err, "failed to apply worker heartbeat");
                            }
                            let _ = consumer.ack(delivery.delivery_tag).await;
                        }
                        Err(err) => {
                            warn!(error = %err, "dropping unparseable heartbeat envelope");
                            let _ = consumer.ack(delivery.delivery_tag).await;
                        }
                    }
                }
            }
        }
    })
}

fn spawn_zombie_sweep(
    engine: Arc<SchedulerEngine>,
    broker: Arc<dyn sched_adapters::BrokerClient>,
    kv: Arc<dyn sched_adapters::KvClient>,
    auto_disable: Arc<AutoDisableController>,
    notify: Arc<dyn NotificationSink>,
    detector: Arc<ZombieDetector>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {
                    match detector.sweep(&engine, kv.as_ref(), broker.as_ref(), &auto_disable, notify.as_ref(), chrono::Utc::now()).await {
                        Ok(report) if report.queued_timed_out > 0 || report.running_crashed > 0 => {
                            info!(queued_timed_out = report.queued_timed_out, running_crashed = report.running_crashed, "zombie sweep found stuck occurrences");
                        }
                        Ok(_) => {}
                        Err(err) => warn!(error = %err, "zombie sweep failed"),
                    }
                }
            }
        }
    })
}
