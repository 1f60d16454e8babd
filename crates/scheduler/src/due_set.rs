// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduled-set maintainer: keeps the `due` sorted set and the
//! `job:<id>` cache hash in step with a job's cron/next-fire/active fields.

use chrono::{DateTime, Duration, Utc};
use sched_adapters::{KvClient, KvError};
use sched_core::ScheduledJob;

/// Cache TTL for `job:<id>` hashes.
pub const JOB_CACHE_TTL_SECONDS: u64 = 24 * 60 * 60;

/// ExecuteAt within this window of `now` is treated as due immediately.
const IMMEDIATE_WINDOW: Duration = Duration::seconds(5);

/// Collapses an execute-at timestamp in the past, or within 5s of now, to
/// `now` itself.
pub fn normalize_execute_at(execute_at: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if execute_at <= now + IMMEDIATE_WINDOW {
        now
    } else {
        execute_at
    }
}

/// The job's next fire time: its explicit `next_fire_at` if still in the
/// future relative to `now`, otherwise the next cron occurrence after `now`.
/// `None` when the job has no schedule left to give (cron exhausted, which
/// in practice never happens for the `cron` crate's standard fields, but
/// kept total rather than panicking).
pub fn next_fire(job: &ScheduledJob, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match (&job.cron, job.next_fire_at) {
        (Some(cron), _) => cron.next_after(now),
        (None, Some(at)) => Some(normalize_execute_at(at, now)),
        (None, None) => None,
    }
}

async fn cache_job(kv: &dyn KvClient, job: &ScheduledJob) -> Result<(), KvError> {
    let payload = serde_json::to_string(job)?;
    kv.cache_job(&job.id.to_string(), &payload, JOB_CACHE_TTL_SECONDS).await
}

/// On create: insert into `due` at the normalized execute-at,
/// write the cache hash.
pub async fn on_job_created(kv: &dyn KvClient, job: &ScheduledJob, now: DateTime<Utc>) -> Result<(), KvError> {
    cache_job(kv, job).await?;
    if job.active {
        if let Some(at) = next_fire(job, now) {
            kv.due_upsert(&job.id.to_string(), at).await?;
        }
    }
    Ok(())
}

/// On update of cron/payload/active: recompute next-fire if
/// cron provided; remove from `due` if deactivated; re-insert at next
/// occurrence if reactivated with a cron.
pub async fn on_job_updated(kv: &dyn KvClient, job: &ScheduledJob, now: DateTime<Utc>) -> Result<(), KvError> {
    cache_job(kv, job).await?;
    let job_id = job.id.to_string();
    if !job.active {
        kv.due_remove(&job_id).await?;
        return Ok(());
    }
    match next_fire(job, now) {
        Some(at) => kv.due_upsert(&job_id, at).await,
        None => kv.due_remove(&job_id).await,
    }
}

/// On delete: remove from `due`, remove cache.
pub async fn on_job_deleted(kv: &dyn KvClient, job_id: &sched_core::JobId) -> Result<(), KvError> {
    let job_id = job_id.to_string();
    kv.due_remove(&job_id).await?;
    kv.evict_job_cache(&job_id).await
}

#[cfg(test)]
#[path = "due_set_tests.rs"]
mod tests;
