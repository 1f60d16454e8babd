use super::*;
use sched_adapters::kv::FakeKv;
use sched_core::{ConcurrencyPolicy, Schedule, ScheduledJob, ScheduledJobBuilder};

fn cron_job(cron: &str) -> ScheduledJob {
    ScheduledJobBuilder::default().cron(Some(Schedule::parse(cron).expect("cron"))).build()
}

#[tokio::test]
async fn create_inserts_into_due_and_caches_job() {
    let kv = FakeKv::new();
    let job = cron_job("0 */5 * * * *");
    let now = Utc::now();

    on_job_created(&kv, &job, now).await.expect("create");

    let due = kv.due_before(now + Duration::minutes(10), 10).await.expect("due");
    assert_eq!(due, vec![job.id.to_string()]);
    assert!(kv.cached_job(&job.id.to_string()).await.expect("cache").is_some());
}

#[tokio::test]
async fn deactivating_removes_from_due_but_keeps_cache() {
    let kv = FakeKv::new();
    let mut job = cron_job("0 */5 * * * *");
    let now = Utc::now();
    on_job_created(&kv, &job, now).await.expect("create");

    job.active = false;
    on_job_updated(&kv, &job, now).await.expect("update");

    assert!(kv.due_before(now + Duration::minutes(10), 10).await.expect("due").is_empty());
    assert!(kv.cached_job(&job.id.to_string()).await.expect("cache").is_some());
}

#[tokio::test]
async fn reactivating_reinserts_at_next_cron_occurrence() {
    let kv = FakeKv::new();
    let mut job = cron_job("0 */5 * * * *");
    job.active = false;
    let now = Utc::now();
    on_job_created(&kv, &job, now).await.expect("create");
    assert!(kv.due_before(now + Duration::minutes(10), 10).await.expect("due").is_empty());

    job.active = true;
    on_job_updated(&kv, &job, now).await.expect("update");

    assert_eq!(kv.due_before(now + Duration::minutes(10), 10).await.expect("due"), vec![job.id.to_string()]);
}

#[tokio::test]
async fn delete_removes_due_entry_and_cache() {
    let kv = FakeKv::new();
    let job = cron_job("0 */5 * * * *");
    let now = Utc::now();
    on_job_created(&kv, &job, now).await.expect("create");

    on_job_deleted(&kv, &job.id).await.expect("delete");

    assert!(kv.due_before(now + Duration::minutes(10), 10).await.expect("due").is_empty());
    assert!(kv.cached_job(&job.id.to_string()).await.expect("cache").is_none());
}

#[test]
fn execute_at_within_five_seconds_normalizes_to_now() {
    let now = Utc::now();
    assert_eq!(normalize_execute_at(now + Duration::seconds(4), now), now);
    assert_eq!(normalize_execute_at(now - Duration::seconds(1), now), now);
}

#[test]
fn execute_at_further_out_is_unchanged() {
    let now = Utc::now();
    let later = now + Duration::seconds(30);
    assert_eq!(normalize_execute_at(later, now), later);
}

#[test]
fn default_concurrency_policy_is_skip() {
    assert_eq!(ConcurrencyPolicy::default(), ConcurrencyPolicy::Skip);
}
