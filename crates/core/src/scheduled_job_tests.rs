use super::*;
use crate::cron::Schedule;

fn job_with_schedule() -> ScheduledJob {
    let config = ScheduledJobConfig::builder("nightly-report", WorkerId::new(), "SendReport")
        .cron(Schedule::parse("0 0 3 * * *").expect("valid cron"))
        .build();
    ScheduledJob::new(JobId::new(), config)
}

#[test]
fn new_job_starts_active_at_version_one() {
    let job = job_with_schedule();
    assert!(job.active);
    assert_eq!(job.version, 1);
    assert!(job.history.is_empty());
}

#[test]
fn has_schedule_requires_next_fire_or_cron() {
    let mut job = job_with_schedule();
    job.cron = None;
    assert!(!job.has_schedule());
    job.next_fire_at = Some(Utc::now());
    assert!(job.has_schedule());
}

#[test]
fn empty_or_valid_json_payload_passes_validation() {
    let mut job = job_with_schedule();
    assert!(job.has_valid_payload());
    job.payload = "{\"retries\": 3}".to_string();
    assert!(job.has_valid_payload());
    job.payload = "not json".to_string();
    assert!(!job.has_valid_payload());
}

#[test]
fn updating_handler_bumps_version_and_snapshots_prior_state() {
    let mut job = job_with_schedule();
    let update = ScheduledJobUpdate { handler_name: Some("SendReportV2".into()), ..Default::default() };
    job.apply_update(update, || "snapshot-of-v1".to_string());
    assert_eq!(job.version, 2);
    assert_eq!(job.history.len(), 1);
    assert_eq!(job.history[0].version, 1);
    assert_eq!(job.handler_name, "SendReportV2");
}

#[test]
fn updating_display_name_alone_does_not_bump_version() {
    let mut job = job_with_schedule();
    let update = ScheduledJobUpdate { display_name: Some("Renamed".into()), ..Default::default() };
    job.apply_update(update, || panic!("snapshot should not be taken"));
    assert_eq!(job.version, 1);
    assert!(job.history.is_empty());
    assert_eq!(job.display_name, "Renamed");
}

#[test]
fn consecutive_failures_trip_the_auto_disable_threshold() {
    let mut job = job_with_schedule();
    let now = Utc::now();
    assert!(!job.record_failure(now, true, 3));
    assert!(!job.record_failure(now, true, 3));
    assert!(job.record_failure(now, true, 3));
    assert_eq!(job.auto_disable.consecutive_failures, 3);
}

#[test]
fn disabled_by_default_does_not_trip_even_past_threshold() {
    let mut job = job_with_schedule();
    let now = Utc::now();
    assert!(!job.record_failure(now, false, 1));
    assert!(!job.record_failure(now, false, 1));
    assert_eq!(job.auto_disable.consecutive_failures, 2);
}

#[test]
fn a_completed_run_resets_the_failure_counter() {
    let mut job = job_with_schedule();
    let now = Utc::now();
    job.record_failure(now, true, 5);
    job.record_failure(now, true, 5);
    job.record_success();
    assert_eq!(job.auto_disable.consecutive_failures, 0);
}
