use super::*;

#[test]
fn default_config_is_valid() {
    let config = Config::default();
    assert!(config.validate().is_ok());
}

#[test]
fn negative_worker_timeout_is_rejected() {
    let mut config = Config::default();
    config.worker.execution_timeout_seconds = -1;
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn zero_worker_timeout_disables_it_and_is_allowed() {
    let mut config = Config::default();
    config.worker.execution_timeout_seconds = 0;
    assert!(config.validate().is_ok());
}

#[test]
fn negative_handler_timeout_is_rejected() {
    let mut config = Config::default();
    config.handlers.push(HandlerConsumerConfig {
        consumer_id: "send-email".into(),
        routing_pattern: "jobs.send-email".into(),
        max_parallel_jobs: 1,
        execution_timeout_seconds: -5,
        max_retries: 3,
        base_retry_delay_seconds: 1,
    });
    assert!(config.validate().is_err());
}

#[test]
fn zero_batch_size_is_rejected() {
    let mut config = Config::default();
    config.dispatcher.batch_size = 0;
    assert!(config.validate().is_err());
}

#[test]
fn toml_round_trips_into_the_config_struct() {
    let toml_text = r#"
        [dispatcher]
        enabled = true
        pollingIntervalSeconds = 10
        batchSize = 50
        lockTtlSeconds = 20
        enableStartupRecovery = false

        [worker]
        workerId = "worker-a"
        maxParallelJobs = 4
        executionTimeoutSeconds = 60

        [worker.heartbeat]
        intervalSeconds = 5
        jobHeartbeatIntervalSeconds = 10
        enabled = true

        [worker.offlineResilience]
        enabled = true
        localStoragePath = "/var/lib/sched/outbox.sqlite3"
        syncIntervalSeconds = 5
        maxSyncRetries = 3
        cleanupIntervalHours = 6
        recordRetentionDays = 7
    "#;
    let config: Config = toml::from_str(toml_text).expect("valid config toml");
    assert_eq!(config.dispatcher.batch_size, 50);
    assert_eq!(config.worker.worker_id, "worker-a");
    assert!(!config.dispatcher.enable_startup_recovery);
}
