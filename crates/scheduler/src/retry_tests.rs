use super::*;
use sched_adapters::FakeBroker;
use sched_core::RetryPolicy;
use sched_storage::Wal;
use tempfile::tempdir;

fn engine_in(dir: &std::path::Path) -> SchedulerEngine {
    let wal = Wal::open(dir.join("wal.ndjson"), 0).expect("open wal");
    SchedulerEngine::new(wal, sched_storage::MaterializedState::default())
}

#[test]
fn non_permanent_failure_under_ceiling_retries_with_backoff() {
    let policy = RetryPolicy::new(3, 2);
    let decision = decide_failed("transient", false, 0, policy);
    assert_eq!(decision, RetryDecision::Retry { delay: std::time::Duration::from_secs(2), next_attempt: 1 });

    let decision = decide_failed("transient", false, 1, policy);
    assert_eq!(decision, RetryDecision::Retry { delay: std::time::Duration::from_secs(4), next_attempt: 2 });
}

#[test]
fn permanent_deserialization_failure_dead_letters_as_invalid_job_data() {
    let policy = RetryPolicy::new(3, 2);
    let decision = decide_failed("[permanent] invalid job data: missing field `id`", true, 0, policy);
    assert_eq!(decision, RetryDecision::DeadLetter { failure_type: FailureType::InvalidJobData });
}

#[test]
fn permanent_business_rule_failure_dead_letters_as_unhandled_exception() {
    let policy = RetryPolicy::new(3, 2);
    let decision = decide_failed("[permanent] order already shipped", true, 0, policy);
    assert_eq!(decision, RetryDecision::DeadLetter { failure_type: FailureType::UnhandledException });
}

#[test]
fn exhausted_attempts_dead_letter_with_max_retries_exceeded() {
    let policy = RetryPolicy::new(2, 1);
    let decision = decide_failed("transient", false, 2, policy);
    assert_eq!(decision, RetryDecision::DeadLetter { failure_type: FailureType::MaxRetriesExceeded });
}

#[test]
fn timed_out_retries_then_dead_letters_as_timeout_not_max_retries() {
    let policy = RetryPolicy::new(1, 1);
    assert_eq!(
        decide_timed_out(0, policy),
        RetryDecision::Retry { delay: std::time::Duration::from_secs(1), next_attempt: 1 }
    );
    assert_eq!(decide_timed_out(1, policy), RetryDecision::DeadLetter { failure_type: FailureType::Timeout });
}

#[test]
fn dependency_failure_dead_letters_as_external_dependency_failure() {
    let policy = RetryPolicy::new(0, 1);
    assert_eq!(
        decide_dependency_failure(0, policy),
        RetryDecision::DeadLetter { failure_type: FailureType::ExternalDependencyFailure }
    );
}

#[test]
fn retry_policies_fall_back_to_default_for_unknown_handlers() {
    let default = RetryPolicy::new(1, 1);
    let mut policies = RetryPolicies::new(default);
    policies.insert("send_email", RetryPolicy::new(5, 10));

    assert_eq!(policies.for_handler("send_email"), RetryPolicy::new(5, 10));
    assert_eq!(policies.for_handler("unregistered"), default);
}

#[tokio::test]
async fn record_dead_letter_persists_and_publishes() {
    let dir = tempdir().expect("tempdir");
    let engine = engine_in(dir.path());
    let broker = FakeBroker::new();
    let job_id = JobId::new();
    let occurrence_id = OccurrenceId::new();

    record_dead_letter(
        &engine,
        &broker,
        job_id,
        occurrence_id,
        "boom".to_string(),
        3,
        FailureType::MaxRetriesExceeded,
    )
    .await
    .expect("record");

    let state = engine.snapshot_state();
    let failed = state.failed_occurrences.get(&occurrence_id).expect("failed occurrence recorded");
    assert_eq!(failed.failure_type, FailureType::MaxRetriesExceeded);
    assert_eq!(failed.retry_count_at_failure, 3);
}

#[tokio::test]
async fn schedule_retry_republishes_for_an_active_job() {
    let dir = tempdir().expect("tempdir");
    let engine = std::sync::Arc::new(engine_in(dir.path()));
    let broker: std::sync::Arc<dyn sched_adapters::BrokerClient> = std::sync::Arc::new(FakeBroker::new());
    let kv: std::sync::Arc<dyn sched_adapters::KvClient> = std::sync::Arc::new(sched_adapters::FakeKv::new());

    let worker_id = sched_core::WorkerId::new();
    let job_id = JobId::new();
    let config = sched_core::ScheduledJobConfig::builder("nightly", worker_id, "export").build();
    engine.apply(Event::JobCreated { id: job_id, config, at: Utc::now() }).expect("create job");

    schedule_retry(engine.clone(), broker.clone(), kv.clone(), job_id, 1, std::time::Duration::from_millis(0)).await;

    let state = engine.snapshot_state();
    let occurrences: Vec<_> = state.occurrences.values().filter(|o| o.job_id == job_id).collect();
    assert_eq!(occurrences.len(), 1);
    assert_eq!(occurrences[0].retry_attempt, 1);
    assert!(kv.is_running(&job_id.to_string()).await.expect("is_running"));
}

#[tokio::test]
async fn schedule_retry_skips_deactivated_jobs() {
    let dir = tempdir().expect("tempdir");
    let engine = std::sync::Arc::new(engine_in(dir.path()));
    let broker: std::sync::Arc<dyn sched_adapters::BrokerClient> = std::sync::Arc::new(FakeBroker::new());
    let kv: std::sync::Arc<dyn sched_adapters::KvClient> = std::sync::Arc::new(sched_adapters::FakeKv::new());

    let worker_id = sched_core::WorkerId::new();
    let job_id = JobId::new();
    let config = sched_core::ScheduledJobConfig::builder("nightly", worker_id, "export").build();
    engine.apply(Event::JobCreated { id: job_id, config, at: Utc::now() }).expect("create job");
    engine.apply(Event::JobDeactivated { id: job_id }).expect("deactivate");

    schedule_retry(engine.clone(), broker, kv, job_id, 1, std::time::Duration::from_millis(0)).await;

    let state = engine.snapshot_state();
    assert!(state.occurrences.values().all(|o| o.job_id != job_id));
}
