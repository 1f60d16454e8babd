// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis-backed [`super::KvClient`]. Uses `redis`'s `ConnectionManager` for
//! transparent reconnect, same as the broker side leans on `lapin`'s own
//! recovery; compound invariants ("check not-running and publish", lock
//! release) go through server-side Lua scripts so they stay atomic under
//! concurrent dispatchers.

use super::{CancellationSubscription, KvClient, KvError, LockToken};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nanoid::nanoid;
use futures_util::StreamExt;
use redis::aio::{ConnectionManager, PubSub};
use redis::{AsyncCommands, Script};
use tracing::{info, warn};

const CANCELLATION_CHANNEL: &str = "cancellation_channel";
const EMERGENCY_STOP_KEY: &str = "emergency_stop";

/// Compare-and-delete: only removes `key` if its value still equals `token`.
/// Mirrors the canonical Redis distributed-lock release idiom (a plain `DEL`
/// would release a lock some other holder has since acquired after our TTL
/// expired).
const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Refreshes a lock's TTL only if we still hold it.
const REFRESH_LOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

pub struct RedisKv {
    conn: ConnectionManager,
    client: redis::Client,
    prefix: String,
}

impl RedisKv {
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, KvError> {
        let client = redis::Client::open(url).map_err(|e| KvError::Connection(e.to_string()))?;
        let conn = ConnectionManager::new(client.clone()).await.map_err(|e| KvError::Connection(e.to_string()))?;
        info!("connected to redis coordination store");
        Ok(Self { conn, client, prefix: prefix.into() })
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix, suffix)
    }

    fn due_key(&self) -> String {
        self.key("due")
    }

    fn job_key(&self, job_id: &str) -> String {
        self.key(&format!("job:{job_id}"))
    }

    fn lock_key(&self, lock_id: &str) -> String {
        self.key(&format!("lock:{lock_id}"))
    }

    fn running_key(&self, job_id: &str) -> String {
        self.key(&format!("running:{job_id}"))
    }

    fn running_index_key(&self) -> String {
        self.key("running_index")
    }

    fn worker_key(&self, worker_id: &str) -> String {
        self.key(&format!("worker:{worker_id}"))
    }

    fn worker_instance_key(&self, worker_id: &str, instance_id: &str) -> String {
        self.key(&format!("worker:{worker_id}:instance:{instance_id}"))
    }
}

#[async_trait]
impl KvClient for RedisKv {
    async fn due_before(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<String>, KvError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .zrangebyscore_limit(self.due_key(), "-inf", now.timestamp(), 0, limit as isize)
            .await
            .map_err(|e| KvError::Connection(e.to_string()))?;
        Ok(ids)
    }

    async fn due_upsert(&self, job_id: &str, execute_at: DateTime<Utc>) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        conn.zadd(self.due_key(), job_id, execute_at.timestamp())
            .await
            .map_err(|e| KvError::Connection(e.to_string()))
    }

    async fn due_remove(&self, job_id: &str) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        conn.zrem(self.due_key(), job_id).await.map_err(|e| KvError::Connection(e.to_string()))
    }

    async fn cache_job(&self, job_id: &str, payload: &str, ttl_seconds: u64) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        conn.set_ex(self.job_key(job_id), payload, ttl_seconds).await.map_err(|e| KvError::Connection(e.to_string()))
    }

    async fn cached_job(&self, job_id: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn.clone();
        conn.get(self.job_key(job_id)).await.map_err(|e| KvError::Connection(e.to_string()))
    }

    async fn evict_job_cache(&self, job_id: &str) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        conn.del(self.job_key(job_id)).await.map_err(|e| KvError::Connection(e.to_string()))
    }

    async fn acquire_lock(&self, lock_id: &str, ttl_seconds: u64) -> Result<Option<LockToken>, KvError> {
        let mut conn = self.conn.clone();
        let token = nanoid!(21);
        let acquired: bool = redis::cmd("SET")
            .arg(self.lock_key(lock_id))
            .arg(&token)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .map_err(|e| KvError::Connection(e.to_string()))?
            .is_some();
        Ok(if acquired { Some(LockToken(token)) } else { None })
    }

    async fn release_lock(&self, lock_id: &str, token: &LockToken) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        Script::new(RELEASE_LOCK_SCRIPT)
            .key(self.lock_key(lock_id))
            .arg(&token.0)
            .invoke_async::<_, i64>(&mut conn)
            .await
            .map_err(|e| KvError::Script(e.to_string()))?;
        Ok(())
    }

    async fn refresh_lock(&self, lock_id: &str, token: &LockToken, ttl_seconds: u64) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let refreshed: i64 = Script::new(REFRESH_LOCK_SCRIPT)
            .key(self.lock_key(lock_id))
            .arg(&token.0)
            .arg(ttl_seconds * 1000)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| KvError::Script(e.to_string()))?;
        Ok(refreshed == 1)
    }

    async fn is_running(&self, job_id: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        conn.exists(self.running_key(job_id)).await.map_err(|e| KvError::Connection(e.to_string()))
    }

    async fn mark_running(&self, job_id: &str, occurrence_id: &str, ttl_seconds: u64) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let deadline = Utc::now().timestamp() + ttl_seconds as i64;
        conn.set_ex::<_, _, ()>(self.running_key(job_id), occurrence_id, ttl_seconds)
            .await
            .map_err(|e| KvError::Connection(e.to_string()))?;
        conn.zadd::<_, _, _, ()>(self.running_index_key(), job_id, deadline)
            .await
            .map_err(|e| KvError::Connection(e.to_string()))
    }

    async fn clear_running(&self, job_id: &str) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.running_key(job_id)).await.map_err(|e| KvError::Connection(e.to_string()))?;
        conn.zrem::<_, _, ()>(self.running_index_key(), job_id).await.map_err(|e| KvError::Connection(e.to_string()))
    }

    async fn stale_running(&self, older_than: DateTime<Utc>) -> Result<Vec<(String, String)>, KvError> {
        let mut conn = self.conn.clone();
        let job_ids: Vec<String> = conn
            .zrangebyscore(self.running_index_key(), "-inf", older_than.timestamp())
            .await
            .map_err(|e| KvError::Connection(e.to_string()))?;
        let mut stale = Vec::with_capacity(job_ids.len());
        for job_id in job_ids {
            match conn.get::<_, Option<String>>(self.running_key(&job_id)).await {
                Ok(Some(occurrence_id)) => stale.push((job_id, occurrence_id)),
                Ok(None) => {
                    // running: key already expired naturally; drop the stale index entry.
                    let _: Result<(), _> = conn.zrem(self.running_index_key(), &job_id).await;
                }
                Err(e) => warn!(job_id = %job_id, error = %e, "failed to read running key during zombie scan"),
            }
        }
        Ok(stale)
    }

    async fn upsert_worker(&self, worker_id: &str, payload: &str) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        conn.set(self.worker_key(worker_id), payload).await.map_err(|e| KvError::Connection(e.to_string()))
    }

    async fn upsert_worker_instance(&self, worker_id: &str, instance_id: &str, payload: &str, ttl_seconds: u64) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        conn.set_ex(self.worker_instance_key(worker_id, instance_id), payload, ttl_seconds)
            .await
            .map_err(|e| KvError::Connection(e.to_string()))
    }

    async fn worker_instance_alive(&self, worker_id: &str, instance_id: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        conn.exists(self.worker_instance_key(worker_id, instance_id)).await.map_err(|e| KvError::Connection(e.to_string()))
    }

    async fn publish_cancellation(&self, occurrence_id: &str) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        conn.publish(CANCELLATION_CHANNEL, occurrence_id).await.map_err(|e| KvError::Connection(e.to_string()))
    }

    async fn subscribe_cancellations(&self) -> Result<Box<dyn CancellationSubscription>, KvError> {
        // `ConnectionManager` multiplexes regular commands but a pub/sub
        // subscription needs a connection of its own per redis-rs.
        let pubsub = self.client.get_async_pubsub().await.map_err(|e| KvError::Connection(e.to_string()))?;
        let mut pubsub = pubsub;
        pubsub.subscribe(CANCELLATION_CHANNEL).await.map_err(|e| KvError::Connection(e.to_string()))?;
        Ok(Box::new(RedisCancellationSubscription { pubsub }))
    }

    async fn emergency_stop_set(&self) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        conn.exists(self.key(EMERGENCY_STOP_KEY)).await.map_err(|e| KvError::Connection(e.to_string()))
    }

    async fn set_emergency_stop(&self, enabled: bool) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        if enabled {
            conn.set(self.key(EMERGENCY_STOP_KEY), "1").await.map_err(|e| KvError::Connection(e.to_string()))
        } else {
            conn.del(self.key(EMERGENCY_STOP_KEY)).await.map_err(|e| KvError::Connection(e.to_string()))
        }
    }
}

struct RedisCancellationSubscription {
    pubsub: PubSub,
}

#[async_trait]
impl CancellationSubscription for RedisCancellationSubscription {
    async fn next(&mut self) -> Result<Option<String>, KvError> {
        match self.pubsub.on_message().next().await {
            Some(msg) => msg.get_payload::<String>().map(Some).map_err(|e| KvError::Decode(e.to_string())),
            None => Ok(None),
        }
    }
}
