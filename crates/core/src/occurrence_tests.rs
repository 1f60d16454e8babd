use super::*;

#[test]
fn new_occurrence_starts_queued_with_one_history_entry() {
    let occ = JobOccurrence::new(OccurrenceId::new(), JobId::new(), 1, Utc::now());
    assert_eq!(occ.status, OccurrenceStatus::Queued);
    assert_eq!(occ.status_history.len(), 1);
}

#[test]
fn starting_an_occurrence_records_worker_and_start_time() {
    let mut occ = JobOccurrence::new(OccurrenceId::new(), JobId::new(), 1, Utc::now());
    let worker = WorkerId::new();
    let now = Utc::now();
    occ.start(worker, now).expect("queued -> running is legal");
    assert_eq!(occ.status, OccurrenceStatus::Running);
    assert_eq!(occ.worker_id, Some(worker));
    assert_eq!(occ.start_time, Some(now));
}

#[test]
fn illegal_transitions_are_rejected_and_do_not_mutate_state() {
    let mut occ = JobOccurrence::new(OccurrenceId::new(), JobId::new(), 1, Utc::now());
    let err = occ.apply_status(OccurrenceStatus::Completed, Utc::now());
    assert!(err.is_err());
    assert_eq!(occ.status, OccurrenceStatus::Queued);
}

#[test]
fn duration_is_end_minus_start_in_milliseconds() {
    let mut occ = JobOccurrence::new(OccurrenceId::new(), JobId::new(), 1, Utc::now());
    let start = Utc::now();
    let end = start + chrono::Duration::milliseconds(2500);
    occ.start(WorkerId::new(), start).unwrap();
    occ.finish(OccurrenceStatus::Completed, end, Some("ok".into()), None).unwrap();
    assert_eq!(occ.duration_ms(), Some(2500));
}

#[test]
fn applying_the_same_terminal_status_twice_is_idempotent() {
    let mut occ = JobOccurrence::new(OccurrenceId::new(), JobId::new(), 1, Utc::now());
    let start = Utc::now();
    let end = start + chrono::Duration::seconds(1);
    occ.start(WorkerId::new(), start).unwrap();
    occ.finish(OccurrenceStatus::Completed, end, Some("ok".into()), None).unwrap();
    let before = occ.clone();

    occ.finish(OccurrenceStatus::Completed, end + chrono::Duration::seconds(1), Some("different".into()), None)
        .unwrap();

    assert_eq!(occ.end_time, before.end_time);
    assert_eq!(occ.result, before.result);
    assert_eq!(occ.status_history.len(), before.status_history.len());
}

#[test]
fn terminal_occurrences_reject_further_transitions() {
    let mut occ = JobOccurrence::new(OccurrenceId::new(), JobId::new(), 1, Utc::now());
    occ.start(WorkerId::new(), Utc::now()).unwrap();
    occ.finish(OccurrenceStatus::Failed, Utc::now(), None, Some("boom".into())).unwrap();
    assert!(occ.apply_status(OccurrenceStatus::Running, Utc::now()).is_err());
}

#[test]
fn logs_are_appended_in_call_order() {
    let mut occ = JobOccurrence::new(OccurrenceId::new(), JobId::new(), 1, Utc::now());
    occ.append_log(LogEntry {
        timestamp: Utc::now(),
        level: LogLevel::Info,
        message: "first".into(),
        data: None,
        category: None,
        exception_type: None,
    });
    occ.append_log(LogEntry {
        timestamp: Utc::now(),
        level: LogLevel::Info,
        message: "second".into(),
        data: None,
        category: None,
        exception_type: None,
    });
    assert_eq!(occ.logs[0].message, "first");
    assert_eq!(occ.logs[1].message, "second");
}
