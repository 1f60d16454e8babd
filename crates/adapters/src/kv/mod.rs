// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! KV/coordination client: sorted-set time index, job-detail
//! cache, per-job locks, the dispatcher leader lock, the running-set, worker
//! registration hashes, and the cancellation pub/sub channel. `KvClient` is
//! the trait the scheduler and worker program against; `RedisKv` is the real
//! implementation, `FakeKv` an in-memory stand-in for tests.

#[cfg(any(test, feature = "test-support"))]
mod fake;
mod redis_kv;

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeKv;
pub use redis_kv::RedisKv;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv connection error: {0}")]
    Connection(String),
    #[error("kv script error: {0}")]
    Script(String),
    #[error("failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to decode value: {0}")]
    Decode(String),
}

/// Opaque proof of lock ownership, returned by [`KvClient::acquire_lock`] and
/// required by [`KvClient::release_lock`] so release is a compare-and-delete
/// rather than an unconditional delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(pub String);

/// Everything the scheduler and worker need from the coordination store
///. All keys are implicitly scoped to a configured prefix; the
/// trait's methods take the unprefixed logical id and the implementation
/// applies the prefix.
#[async_trait]
pub trait KvClient: Send + Sync + 'static {
    /// `ZRANGEBYSCORE due -inf now LIMIT 0 batch`.
    async fn due_before(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<String>, KvError>;
    /// `ZADD due <score> <jobId>`.
    async fn due_upsert(&self, job_id: &str, execute_at: DateTime<Utc>) -> Result<(), KvError>;
    /// `ZREM due <jobId>`.
    async fn due_remove(&self, job_id: &str) -> Result<(), KvError>;

    /// Write/replace the cached `job:<id>` hash with a TTL.
    async fn cache_job(&self, job_id: &str, payload: &str, ttl_seconds: u64) -> Result<(), KvError>;
    /// Read the cached `job:<id>` hash; `None` on cache miss.
    async fn cached_job(&self, job_id: &str) -> Result<Option<String>, KvError>;
    async fn evict_job_cache(&self, job_id: &str) -> Result<(), KvError>;

    /// Atomic SET-if-absent with TTL on `lock:<id>`; `None` if already held.
    async fn acquire_lock(&self, lock_id: &str, ttl_seconds: u64) -> Result<Option<LockToken>, KvError>;
    /// Compare-and-delete; a no-op (not an error) if the token is stale.
    async fn release_lock(&self, lock_id: &str, token: &LockToken) -> Result<(), KvError>;
    /// Re-extend a held lock's TTL without releasing it (dispatcher leader
    /// lock refresh, TTL-refreshed each iteration).
    async fn refresh_lock(&self, lock_id: &str, token: &LockToken, ttl_seconds: u64) -> Result<bool, KvError>;

    /// `running:<jobId>` presence check for the Skip concurrency policy.
    async fn is_running(&self, job_id: &str) -> Result<bool, KvError>;
    async fn mark_running(&self, job_id: &str, occurrence_id: &str, ttl_seconds: u64) -> Result<(), KvError>;
    async fn clear_running(&self, job_id: &str) -> Result<(), KvError>;
    /// All `running:<jobId>` keys whose TTL-implied deadline has already
    /// passed, for the zombie sweep.
    async fn stale_running(&self, older_than: DateTime<Utc>) -> Result<Vec<(String, String)>, KvError>;

    async fn upsert_worker(&self, worker_id: &str, payload: &str) -> Result<(), KvError>;
    async fn upsert_worker_instance(&self, worker_id: &str, instance_id: &str, payload: &str, ttl_seconds: u64) -> Result<(), KvError>;
    async fn worker_instance_alive(&self, worker_id: &str, instance_id: &str) -> Result<bool, KvError>;

    /// Publish a cancellation request on `cancellation_channel`.
    async fn publish_cancellation(&self, occurrence_id: &str) -> Result<(), KvError>;
    /// Subscribe to `cancellation_channel`; returns a stream-like handle the
    /// caller polls for newly published occurrence ids.
    async fn subscribe_cancellations(&self) -> Result<Box<dyn CancellationSubscription>, KvError>;

    /// The operator emergency-stop flag consulted each dispatcher tick.
    async fn emergency_stop_set(&self) -> Result<bool, KvError>;
    async fn set_emergency_stop(&self, enabled: bool) -> Result<(), KvError>;
}

#[async_trait]
pub trait CancellationSubscription: Send {
    /// Blocks until the next cancellation message arrives, or returns `None`
    /// if the subscription was closed.
    async fn next(&mut self) -> Result<Option<String>, KvError>;
}
