use super::*;
use chrono::Utc;
use sched_core::{
    FailureType, JobId, OccurrenceId, OccurrenceStatus, ScheduledJobConfig, WorkerId,
};

fn job_created(id: JobId) -> Event {
    Event::JobCreated {
        id,
        config: ScheduledJobConfig::builder("nightly-report", WorkerId::new(), "send_report").build(),
        at: Utc::now(),
    }
}

#[test]
fn job_created_is_idempotent_on_replay() {
    let mut state = MaterializedState::default();
    let id = JobId::new();
    state.apply_event(&job_created(id));
    let version_after_first = state.get_job(&id).unwrap().version;

    // Replaying the same create must not reset the job that has since moved on.
    state.jobs.get_mut(&id).unwrap().version = 7;
    state.apply_event(&job_created(id));
    assert_eq!(state.get_job(&id).unwrap().version, 7);
    let _ = version_after_first;
}

#[test]
fn job_deletion_cascades_to_its_occurrences() {
    let mut state = MaterializedState::default();
    let job_id = JobId::new();
    let occurrence_id = OccurrenceId::new();
    state.apply_event(&job_created(job_id));
    state.apply_event(&Event::OccurrenceCreated {
        id: occurrence_id,
        job_id,
        job_version_snapshot: 1,
        at: Utc::now(),
    });
    assert!(state.get_occurrence(&occurrence_id).is_some());

    state.apply_event(&Event::JobDeleted { id: job_id });
    assert!(state.get_job(&job_id).is_none());
    assert!(state.get_occurrence(&occurrence_id).is_none());
}

#[test]
fn occurrence_status_change_to_terminal_is_idempotent() {
    let mut state = MaterializedState::default();
    let job_id = JobId::new();
    let occurrence_id = OccurrenceId::new();
    state.apply_event(&job_created(job_id));
    state.apply_event(&Event::OccurrenceCreated {
        id: occurrence_id,
        job_id,
        job_version_snapshot: 1,
        at: Utc::now(),
    });

    let completed = Event::OccurrenceStatusChanged {
        id: occurrence_id,
        status: OccurrenceStatus::Completed,
        at: Utc::now(),
        worker_id: None,
        result: Some("ok".to_string()),
        exception: None,
    };
    state.apply_event(&completed);
    let after_first = state.get_occurrence(&occurrence_id).unwrap().clone();

    // A replayed delivery of the same terminal event must be a no-op.
    state.apply_event(&completed);
    let after_second = state.get_occurrence(&occurrence_id).unwrap().clone();
    assert_eq!(after_first.status, after_second.status);
    assert_eq!(after_first.end_time, after_second.end_time);
    assert_eq!(after_first.result, after_second.result);
}

#[test]
fn skip_policy_jobs_never_accumulate_more_than_one_non_terminal_occurrence() {
    let mut state = MaterializedState::default();
    let job_id = JobId::new();
    state.apply_event(&job_created(job_id));

    let first = OccurrenceId::new();
    state.apply_event(&Event::OccurrenceCreated {
        id: first,
        job_id,
        job_version_snapshot: 1,
        at: Utc::now(),
    });
    assert_eq!(state.non_terminal_occurrences_for(&job_id).len(), 1);

    state.apply_event(&Event::OccurrenceStatusChanged {
        id: first,
        status: OccurrenceStatus::Completed,
        at: Utc::now(),
        worker_id: None,
        result: None,
        exception: None,
    });
    assert_eq!(state.non_terminal_occurrences_for(&job_id).len(), 0);
}

#[test]
fn failed_occurrence_is_recorded_at_most_once_per_occurrence() {
    let mut state = MaterializedState::default();
    let job_id = JobId::new();
    let occurrence_id = OccurrenceId::new();

    let record = Event::FailedOccurrenceRecorded {
        job_id,
        occurrence_id,
        final_exception: "boom".to_string(),
        retry_count_at_failure: 3,
        failure_type: FailureType::MaxRetriesExceeded,
        at: Utc::now(),
    };
    state.apply_event(&record);
    state.failed_occurrences.get_mut(&occurrence_id).unwrap().resolve("acked");
    state.apply_event(&record);

    assert!(state.failed_occurrences.get(&occurrence_id).unwrap().resolved);
}

#[test]
fn worker_heartbeat_refreshes_its_in_flight_occurrences() {
    let mut state = MaterializedState::default();
    let job_id = JobId::new();
    let occurrence_id = OccurrenceId::new();
    let worker_id = WorkerId::new();
    state.apply_event(&job_created(job_id));
    state.apply_event(&Event::OccurrenceCreated {
        id: occurrence_id,
        job_id,
        job_version_snapshot: 1,
        at: Utc::now(),
    });

    let instance = sched_core::WorkerInstance {
        instance_id: sched_core::InstanceId::new(),
        current_jobs: 1,
        max_parallel_jobs: 4,
        last_heartbeat: Utc::now(),
        status: sched_core::WorkerStatus::Active,
        job_heartbeats: vec![occurrence_id],
    };
    state.apply_event(&Event::WorkerRegistered {
        worker_id,
        handlers: Vec::new(),
        version: 1,
        instance: instance.clone(),
    });
    state.apply_event(&Event::WorkerHeartbeat { worker_id, instance: instance.clone() });

    assert_eq!(
        state.get_occurrence(&occurrence_id).unwrap().last_heartbeat,
        Some(instance.last_heartbeat)
    );
}
