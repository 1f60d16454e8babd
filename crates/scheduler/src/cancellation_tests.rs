use super::*;
use sched_adapters::{FakeBroker, FakeKv};
use sched_core::{ScheduledJobConfig, WorkerId};
use sched_storage::{MaterializedState, Wal};
use tempfile::tempdir;

fn engine_in(dir: &std::path::Path) -> SchedulerEngine {
    let wal = Wal::open(dir.join("wal.ndjson"), 0).expect("open wal");
    SchedulerEngine::new(wal, MaterializedState::default())
}

fn job_and_occurrence(engine: &SchedulerEngine) -> (sched_core::JobId, OccurrenceId) {
    let job_id = sched_core::JobId::new();
    let config = ScheduledJobConfig::builder("nightly-export", WorkerId::new(), "export").build();
    engine.apply(Event::JobCreated { id: job_id, config, at: Utc::now() }).expect("create job");
    let occurrence_id = OccurrenceId::new();
    engine.apply(Event::OccurrenceCreated { id: occurrence_id, job_id, job_version_snapshot: 1, at: Utc::now() }).expect("create occurrence");
    (job_id, occurrence_id)
}

#[tokio::test]
async fn cancelling_a_queued_occurrence_resolves_it_directly() {
    let dir = tempdir().expect("tempdir");
    let engine = engine_in(dir.path());
    let kv = FakeKv::new();
    let broker = FakeBroker::new();
    let bus = CancellationBus;

    let (_job_id, occurrence_id) = job_and_occurrence(&engine);
    let outcome = bus.request_cancellation(&engine, &kv, &broker, occurrence_id, Utc::now()).await.expect("cancel");

    assert_eq!(outcome, CancellationOutcome::CancelledImmediately);
    let state = engine.snapshot_state();
    assert_eq!(state.get_occurrence(&occurrence_id).expect("occurrence").status, OccurrenceStatus::Cancelled);
    let failed = state.failed_occurrences.get(&occurrence_id).expect("dead-lettered");
    assert_eq!(failed.failure_type, FailureType::Cancelled);
}

#[tokio::test]
async fn cancelling_a_running_occurrence_publishes_a_request_instead() {
    let dir = tempdir().expect("tempdir");
    let engine = engine_in(dir.path());
    let kv = FakeKv::new();
    let broker = FakeBroker::new();
    let bus = CancellationBus;

    let (_job_id, occurrence_id) = job_and_occurrence(&engine);
    let worker_id = WorkerId::new();
    engine
        .apply(Event::OccurrenceStatusChanged {
            id: occurrence_id,
            status: OccurrenceStatus::Running,
            at: Utc::now(),
            worker_id: Some(worker_id),
            result: None,
            exception: None,
        })
        .expect("start");

    let mut subscription = kv.subscribe_cancellations().await.expect("subscribe");
    let outcome = bus.request_cancellation(&engine, &kv, &broker, occurrence_id, Utc::now()).await.expect("cancel");

    assert_eq!(outcome, CancellationOutcome::RequestedFromWorker);
    let state = engine.snapshot_state();
    assert_eq!(state.get_occurrence(&occurrence_id).expect("occurrence").status, OccurrenceStatus::Running);
    let published = subscription.next().await.expect("next").expect("a cancellation was published");
    assert_eq!(published, occurrence_id.to_string());
}

#[tokio::test]
async fn cancelling_an_already_terminal_occurrence_is_a_no_op() {
    let dir = tempdir().expect("tempdir");
    let engine = engine_in(dir.path());
    let kv = FakeKv::new();
    let broker = FakeBroker::new();
    let bus = CancellationBus;

    let (_job_id, occurrence_id) = job_and_occurrence(&engine);
    engine
        .apply(Event::OccurrenceStatusChanged {
            id: occurrence_id,
            status: OccurrenceStatus::Completed,
            at: Utc::now(),
            worker_id: None,
            result: Some("ok".into()),
            exception: None,
        })
        .expect("complete");

    let outcome = bus.request_cancellation(&engine, &kv, &broker, occurrence_id, Utc::now()).await.expect("cancel");
    assert_eq!(outcome, CancellationOutcome::NoOp);
}
