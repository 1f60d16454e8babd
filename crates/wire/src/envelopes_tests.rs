use super::*;
use sched_core::{HandlerDescriptor, InstanceId, JobId, LogLevel, OccurrenceId, WorkerId};
use std::collections::HashMap;

fn sample_job_message() -> JobMessageEnvelope {
    JobMessageEnvelope {
        job_id: JobId::new(),
        correlation_id: OccurrenceId::new(),
        job_name: "send_report".to_string(),
        job_data: r#"{"to":"ops@example.com"}"#.to_string(),
        job_version: 3,
        execution_timeout_seconds: Some(60),
        zombie_timeout_minutes: None,
        published_at: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
    }
}

fn sample_status_update() -> StatusUpdateEnvelope {
    StatusUpdateEnvelope {
        correlation_id: OccurrenceId::new(),
        job_id: JobId::new(),
        worker_id: WorkerId::new(),
        status: OccurrenceStatus::Completed,
        start_time: Some(DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()),
        end_time: Some(DateTime::<Utc>::from_timestamp(1_700_000_005, 0).unwrap()),
        duration_ms: Some(5_000),
        result: Some("ok".to_string()),
        exception: None,
        message_timestamp: DateTime::<Utc>::from_timestamp(1_700_000_005, 0).unwrap(),
    }
}

fn sample_log_envelope() -> LogEnvelope {
    LogEnvelope {
        correlation_id: OccurrenceId::new(),
        worker_id: WorkerId::new(),
        log: LogPayload {
            timestamp: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
            level: LogLevel::Info,
            message: "starting handler".to_string(),
            data: None,
            category: Some("handler".to_string()),
            exception_type: None,
        },
        message_timestamp: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
    }
}

fn sample_registration() -> RegistrationEnvelope {
    let mut metadata = HashMap::new();
    metadata.insert("region".to_string(), "us-east-1".to_string());
    RegistrationEnvelope {
        worker_id: WorkerId::new(),
        instance_id: InstanceId::new(),
        handlers: vec![HandlerDescriptor {
            name: "send_report".to_string(),
            routing_pattern: "jobs.reports".to_string(),
            max_parallel_jobs: 5,
            execution_timeout_seconds: Some(120),
            job_data_schema: None,
        }],
        version: 2,
        metadata,
    }
}

fn sample_heartbeat() -> HeartbeatEnvelope {
    HeartbeatEnvelope {
        worker_id: WorkerId::new(),
        instance_id: InstanceId::new(),
        current_jobs: 1,
        max_parallel_jobs: 5,
        status: WorkerStatus::Active,
        jobs: vec![JobHeartbeat {
            correlation_id: OccurrenceId::new(),
            last_heartbeat: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
        }],
    }
}

#[test]
fn job_message_round_trips() {
    let original = sample_job_message();
    let json = serde_json::to_string(&original).expect("serialize");
    let back: JobMessageEnvelope = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(original, back);
}

#[test]
fn status_update_round_trips() {
    let original = sample_status_update();
    let json = serde_json::to_string(&original).expect("serialize");
    let back: StatusUpdateEnvelope = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(original, back);
}

#[test]
fn log_envelope_round_trips() {
    let original = sample_log_envelope();
    let json = serde_json::to_string(&original).expect("serialize");
    let back: LogEnvelope = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(original, back);
}

#[test]
fn registration_round_trips() {
    let original = sample_registration();
    let json = serde_json::to_string(&original).expect("serialize");
    let back: RegistrationEnvelope = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(original, back);
}

#[test]
fn heartbeat_round_trips() {
    let original = sample_heartbeat();
    let json = serde_json::to_string(&original).expect("serialize");
    let back: HeartbeatEnvelope = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(original, back);
}

#[test]
fn job_message_uses_camel_case_field_names() {
    let json = serde_json::to_value(sample_job_message()).expect("serialize");
    let obj = json.as_object().expect("object");
    assert!(obj.contains_key("jobId"));
    assert!(obj.contains_key("correlationId"));
    assert!(obj.contains_key("jobVersion"));
    assert!(obj.contains_key("publishedAt"));
    assert!(!obj.contains_key("job_id"));
}

#[test]
fn status_update_duration_is_computed_from_timestamps_not_trusted_from_wire() {
    let mut envelope = sample_status_update();
    envelope.duration_ms = Some(999_999); // a lying worker
    assert_eq!(envelope.computed_duration_ms(), Some(5_000));
}

#[yare::parameterized(
    queued = { OccurrenceStatus::Queued },
    running = { OccurrenceStatus::Running },
    completed = { OccurrenceStatus::Completed },
    failed = { OccurrenceStatus::Failed },
    cancelled = { OccurrenceStatus::Cancelled },
    timed_out = { OccurrenceStatus::TimedOut },
    unknown = { OccurrenceStatus::Unknown },
)]
fn every_occurrence_status_round_trips_in_a_status_update(status: OccurrenceStatus) {
    let mut envelope = sample_status_update();
    envelope.status = status;
    let json = serde_json::to_string(&envelope).expect("serialize");
    let back: StatusUpdateEnvelope = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back.status, status);
}
