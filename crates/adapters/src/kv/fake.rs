// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory [`super::KvClient`] fake, mirroring [`super::super::broker::FakeBroker`].

use super::{CancellationSubscription, KvClient, KvError, LockToken};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct State {
    due: BTreeMap<i64, Vec<String>>,
    job_cache: HashMap<String, String>,
    locks: HashMap<String, String>,
    running: HashMap<String, String>,
    running_index: BTreeMap<String, i64>,
    workers: HashMap<String, String>,
    worker_instances: HashMap<(String, String), String>,
    emergency_stop: bool,
    cancellations: Vec<VecDeque<String>>,
}

/// In-memory stand-in for [`super::RedisKv`].
#[derive(Clone, Default)]
pub struct FakeKv {
    state: Arc<Mutex<State>>,
    lock_tokens: Arc<AtomicU64>,
}

impl FakeKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvClient for FakeKv {
    async fn due_before(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<String>, KvError> {
        let state = self.state.lock();
        let mut out = Vec::new();
        for (_, ids) in state.due.range(..=now.timestamp()) {
            for id in ids {
                if out.len() >= limit {
                    return Ok(out);
                }
                out.push(id.clone());
            }
        }
        Ok(out)
    }

    async fn due_upsert(&self, job_id: &str, execute_at: DateTime<Utc>) -> Result<(), KvError> {
        let mut state = self.state.lock();
        for ids in state.due.values_mut() {
            ids.retain(|id| id != job_id);
        }
        state.due.entry(execute_at.timestamp()).or_default().push(job_id.to_string());
        Ok(())
    }

    async fn due_remove(&self, job_id: &str) -> Result<(), KvError> {
        let mut state = self.state.lock();
        for ids in state.due.values_mut() {
            ids.retain(|id| id != job_id);
        }
        Ok(())
    }

    async fn cache_job(&self, job_id: &str, payload: &str, _ttl_seconds: u64) -> Result<(), KvError> {
        self.state.lock().job_cache.insert(job_id.to_string(), payload.to_string());
        Ok(())
    }

    async fn cached_job(&self, job_id: &str) -> Result<Option<String>, KvError> {
        Ok(self.state.lock().job_cache.get(job_id).cloned())
    }

    async fn evict_job_cache(&self, job_id: &str) -> Result<(), KvError> {
        self.state.lock().job_cache.remove(job_id);
        Ok(())
    }

    async fn acquire_lock(&self, lock_id: &str, _ttl_seconds: u64) -> Result<Option<LockToken>, KvError> {
        let mut state = self.state.lock();
        if state.locks.contains_key(lock_id) {
            return Ok(None);
        }
        let token = self.lock_tokens.fetch_add(1, Ordering::Relaxed).to_string();
        state.locks.insert(lock_id.to_string(), token.clone());
        Ok(Some(LockToken(token)))
    }

    async fn release_lock(&self, lock_id: &str, token: &LockToken) -> Result<(), KvError> {
        let mut state = self.state.lock();
        if state.locks.get(lock_id) == Some(&token.0) {
            state.locks.remove(lock_id);
        }
        Ok(())
    }

    async fn refresh_lock(&self, lock_id: &str, token: &LockToken, _ttl_seconds: u64) -> Result<bool, KvError> {
        let state = self.state.lock();
        Ok(state.locks.get(lock_id) == Some(&token.0))
    }

    async fn is_running(&self, job_id: &str) -> Result<bool, KvError> {
        Ok(self.state.lock().running.contains_key(job_id))
    }

    async fn mark_running(&self, job_id: &str, occurrence_id: &str, ttl_seconds: u64) -> Result<(), KvError> {
        let mut state = self.state.lock();
        state.running.insert(job_id.to_string(), occurrence_id.to_string());
        let deadline = Utc::now().timestamp() + ttl_seconds as i64;
        state.running_index.insert(job_id.to_string(), deadline);
        Ok(())
    }

    async fn clear_running(&self, job_id: &str) -> Result<(), KvError> {
        let mut state = self.state.lock();
        state.running.remove(job_id);
        state.running_index.remove(job_id);
        Ok(())
    }

    async fn stale_running(&self, older_than: DateTime<Utc>) -> Result<Vec<(String, String)>, KvError> {
        let state = self.state.lock();
        let cutoff = older_than.timestamp();
        Ok(state
            .running_index
            .iter()
            .filter(|(_, deadline)| **deadline <= cutoff)
            .filter_map(|(job_id, _)| state.running.get(job_id).map(|occ| (job_id.clone(), occ.clone())))
            .collect())
    }

    async fn upsert_worker(&self, worker_id: &str, payload: &str) -> Result<(), KvError> {
        self.state.lock().workers.insert(worker_id.to_string(), payload.to_string());
        Ok(())
    }

    async fn upsert_worker_instance(&self, worker_id: &str, instance_id: &str, payload: &str, _ttl_seconds: u64) -> Result<(), KvError> {
        self.state.lock().worker_instances.insert((worker_id.to_string(), instance_id.to_string()), payload.to_string());
        Ok(())
    }

    async fn worker_instance_alive(&self, worker_id: &str, instance_id: &str) -> Result<bool, KvError> {
        Ok(self.state.lock().worker_instances.contains_key(&(worker_id.to_string(), instance_id.to_string())))
    }

    async fn publish_cancellation(&self, occurrence_id: &str) -> Result<(), KvError> {
        let mut state = self.state.lock();
        for queue in &mut state.cancellations {
            queue.push_back(occurrence_id.to_string());
        }
        Ok(())
    }

    async fn subscribe_cancellations(&self) -> Result<Box<dyn CancellationSubscription>, KvError> {
        let mut state = self.state.lock();
        state.cancellations.push(VecDeque::new());
        let index = state.cancellations.len() - 1;
        Ok(Box::new(FakeCancellationSubscription { state: self.state.clone(), index }))
    }

    async fn emergency_stop_set(&self) -> Result<bool, KvError> {
        Ok(self.state.lock().emergency_stop)
    }

    async fn set_emergency_stop(&self, enabled: bool) -> Result<(), KvError> {
        self.state.lock().emergency_stop = enabled;
        Ok(())
    }
}

struct FakeCancellationSubscription {
    state: Arc<Mutex<State>>,
    index: usize,
}

#[async_trait]
impl CancellationSubscription for FakeCancellationSubscription {
    async fn next(&mut self) -> Result<Option<String>, KvError> {
        Ok(self.state.lock().cancellations[self.index].pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_acquire_is_exclusive_until_released() {
        let kv = FakeKv::new();
        let first = kv.acquire_lock("dispatcher", 30).await.expect("acquire").expect("granted");
        assert!(kv.acquire_lock("dispatcher", 30).await.expect("acquire").is_none());

        kv.release_lock("dispatcher", &first).await.expect("release");
        assert!(kv.acquire_lock("dispatcher", 30).await.expect("acquire").is_some());
    }

    #[tokio::test]
    async fn release_with_stale_token_is_a_no_op() {
        let kv = FakeKv::new();
        let first = kv.acquire_lock("dispatcher", 30).await.expect("acquire").expect("granted");
        let stale = LockToken("not-the-real-token".to_string());
        kv.release_lock("dispatcher", &stale).await.expect("release");
        assert!(kv.acquire_lock("dispatcher", 30).await.expect("acquire").is_none());

        kv.release_lock("dispatcher", &first).await.expect("release");
        assert!(kv.acquire_lock("dispatcher", 30).await.expect("acquire").is_some());
    }

    #[tokio::test]
    async fn due_before_respects_limit_and_ordering() {
        let kv = FakeKv::new();
        let now = Utc::now();
        kv.due_upsert("late", now + chrono::Duration::seconds(10)).await.expect("upsert");
        kv.due_upsert("earliest", now - chrono::Duration::seconds(20)).await.expect("upsert");
        kv.due_upsert("middle", now - chrono::Duration::seconds(5)).await.expect("upsert");

        let due = kv.due_before(now, 2).await.expect("due_before");
        assert_eq!(due, vec!["earliest".to_string(), "middle".to_string()]);
    }

    #[tokio::test]
    async fn cancellation_publish_reaches_all_subscribers() {
        let kv = FakeKv::new();
        let mut sub_a = kv.subscribe_cancellations().await.expect("subscribe");
        let mut sub_b = kv.subscribe_cancellations().await.expect("subscribe");
        kv.publish_cancellation("occ-1").await.expect("publish");

        assert_eq!(sub_a.next().await.expect("next"), Some("occ-1".to_string()));
        assert_eq!(sub_b.next().await.expect("next"), Some("occ-1".to_string()));
    }

    #[tokio::test]
    async fn stale_running_only_returns_entries_past_cutoff() {
        let kv = FakeKv::new();
        kv.mark_running("job-1", "occ-1", 0).await.expect("mark");
        let stale = kv.stale_running(Utc::now() + chrono::Duration::seconds(1)).await.expect("stale");
        assert_eq!(stale, vec![("job-1".to_string(), "occ-1".to_string())]);
    }
}
