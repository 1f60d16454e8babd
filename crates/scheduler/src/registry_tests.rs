use super::*;
use sched_adapters::FakeKv;
use sched_core::{HandlerDescriptor, OccurrenceId};
use sched_storage::{MaterializedState, Wal};
use sched_wire::{HeartbeatEnvelope, JobHeartbeat};
use tempfile::tempdir;

fn engine_in(dir: &std::path::Path) -> SchedulerEngine {
    let wal = Wal::open(dir.join("wal.ndjson"), 0).expect("open wal");
    SchedulerEngine::new(wal, MaterializedState::default())
}

fn handler() -> HandlerDescriptor {
    HandlerDescriptor {
        name: "export".into(),
        routing_pattern: "export.*".into(),
        max_parallel_jobs: 4,
        execution_timeout_seconds: Some(3600),
        job_data_schema: None,
    }
}

#[tokio::test]
async fn registration_creates_the_worker_record_and_its_instance() {
    let dir = tempdir().expect("tempdir");
    let engine = engine_in(dir.path());
    let kv = FakeKv::new();
    let registry = WorkerRegistry::new(60);

    let worker_id = WorkerId::new();
    let instance_id = InstanceId::new();
    let envelope = RegistrationEnvelope {
        worker_id,
        instance_id,
        handlers: vec![handler()],
        version: 1,
        metadata: Default::default(),
    };

    registry.handle_registration(&engine, &kv, &envelope, Utc::now()).await.expect("register");

    let state = engine.snapshot_state();
    let record = state.workers.get(&worker_id).expect("worker recorded");
    assert_eq!(record.handlers.len(), 1);
    assert!(record.instances.contains_key(&instance_id));
    assert_eq!(record.instances.get(&instance_id).expect("instance").max_parallel_jobs, 4);
}

#[tokio::test]
async fn heartbeat_refreshes_instance_and_occurrence_last_heartbeat() {
    let dir = tempdir().expect("tempdir");
    let engine = engine_in(dir.path());
    let kv = FakeKv::new();
    let registry = WorkerRegistry::new(60);

    let worker_id = WorkerId::new();
    let instance_id = InstanceId::new();
    let envelope = RegistrationEnvelope {
        worker_id,
        instance_id,
        handlers: vec![handler()],
        version: 1,
        metadata: Default::default(),
    };
    registry.handle_registration(&engine, &kv, &envelope, Utc::now()).await.expect("register");

    let job_id = JobId::new();
    let config = sched_core::ScheduledJobConfig::builder("nightly", worker_id, "export").build();
    engine.apply(Event::JobCreated { id: job_id, config, at: Utc::now() }).expect("create job");
    let occurrence_id = OccurrenceId::new();
    engine.apply(Event::OccurrenceCreated { id: occurrence_id, job_id, job_version_snapshot: 1, at: Utc::now() }).expect("create occurrence");

    let beat_time = Utc::now();
    let heartbeat = HeartbeatEnvelope {
        worker_id,
        instance_id,
        current_jobs: 1,
        max_parallel_jobs: 4,
        status: WorkerStatus::Active,
        jobs: vec![JobHeartbeat { correlation_id: occurrence_id, last_heartbeat: beat_time }],
    };
    registry.handle_heartbeat(&engine, &kv, &heartbeat, beat_time).await.expect("heartbeat");

    let state = engine.snapshot_state();
    let record = state.workers.get(&worker_id).expect("worker recorded");
    let instance = record.instances.get(&instance_id).expect("instance recorded");
    assert_eq!(instance.current_jobs, 1);
    let occurrence = state.get_occurrence(&occurrence_id).expect("occurrence");
    assert_eq!(occurrence.last_heartbeat, Some(beat_time));
}

#[tokio::test]
async fn shutdown_marks_the_instance_without_removing_it() {
    let dir = tempdir().expect("tempdir");
    let engine = engine_in(dir.path());
    let kv = FakeKv::new();
    let registry = WorkerRegistry::new(60);

    let worker_id = WorkerId::new();
    let instance_id = InstanceId::new();
    let envelope = RegistrationEnvelope {
        worker_id,
        instance_id,
        handlers: vec![handler()],
        version: 1,
        metadata: Default::default(),
    };
    registry.handle_registration(&engine, &kv, &envelope, Utc::now()).await.expect("register");

    registry.handle_shutdown(&engine, worker_id, instance_id).expect("shutdown");

    let state = engine.snapshot_state();
    let record = state.workers.get(&worker_id).expect("worker recorded");
    let instance = record.instances.get(&instance_id).expect("instance still present");
    assert_eq!(instance.status, WorkerStatus::Shutdown);
    assert_eq!(record.derived_status(Utc::now(), chrono::Duration::seconds(30)), WorkerStatus::Shutdown);
}
