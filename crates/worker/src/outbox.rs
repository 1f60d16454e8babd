// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker outbox: a local durable store for status updates and
//! logs the worker couldn't publish immediately. Backed by an embedded
//! SQLite file (`rusqlite`, bundled) since the drain-oldest-N / mark-synced
//! / delete-by-retention access pattern is relational, not event-sourced —
//! a different shape from the scheduler's own append-only WAL.

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use sched_adapters::{BrokerClient, BrokerError};
use sched_core::{LogEntry, OccurrenceId, WorkerId};
use sched_wire::{LogEnvelope, StatusUpdateEnvelope};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("outbox sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to (de)serialize outbox record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What one sync pass did, for logging/metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub status_updates_flushed: usize,
    pub logs_flushed: usize,
    pub status_updates_dropped: usize,
    pub logs_dropped: usize,
}

pub struct Outbox {
    conn: Mutex<Connection>,
}

impl Outbox {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OutboxError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS pending_status_updates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                synced INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS pending_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                synced INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_status_updates_synced ON pending_status_updates(synced);
            CREATE INDEX IF NOT EXISTS idx_logs_synced ON pending_logs(synced);",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn enqueue_status_update(&self, envelope: &StatusUpdateEnvelope) -> Result<(), OutboxError> {
        let payload = serde_json::to_string(envelope)?;
        self.conn.lock().execute(
            "INSERT INTO pending_status_updates (payload, created_at) VALUES (?1, ?2)",
            params![payload, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Logs never fail to enqueue from the caller's perspective: a
    /// serialization error here would mean a bug in `LogEntry`'s own
    /// derive, not something a handler can act on, so it's logged and
    /// swallowed rather than threaded back through every `JobContext::log`
    /// call site.
    pub fn enqueue_log(&self, occurrence_id: OccurrenceId, worker_id: WorkerId, log: LogEntry) {
        let envelope = LogEnvelope { correlation_id: occurrence_id, worker_id, log, message_timestamp: Utc::now() };
        if let Err(err) = self.try_enqueue_log(&envelope) {
            tracing::warn!(error = %err, occurrence_id = %occurrence_id, "failed to persist log to outbox");
        }
    }

    fn try_enqueue_log(&self, envelope: &LogEnvelope) -> Result<(), OutboxError> {
        let payload = serde_json::to_string(envelope)?;
        self.conn.lock().execute(
            "INSERT INTO pending_logs (payload, created_at) VALUES (?1, ?2)",
            params![payload, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Flush up to `max_per_kind` unsynced records of each kind, retrying
    /// each record up to `max_attempts` times before giving up on it (spec
    /// §4.L "mark as synced to avoid blocking the pipeline").
    pub async fn sync(&self, broker: &dyn BrokerClient, max_per_kind: usize, max_attempts: u32) -> Result<SyncReport, OutboxError> {
        let mut report = SyncReport::default();
        report.status_updates_dropped += self.sync_status_updates(broker, max_per_kind, max_attempts, &mut report.status_updates_flushed).await?;
        report.logs_dropped += self.sync_logs(broker, max_per_kind, max_attempts, &mut report.logs_flushed).await?;
        Ok(report)
    }

    async fn sync_status_updates(&self, broker: &dyn BrokerClient, limit: usize, max_attempts: u32, flushed: &mut usize) -> Result<usize, OutboxError> {
        let rows = self.select_unsynced("pending_status_updates", limit)?;
        let mut dropped = 0;
        for (id, payload, attempts) in rows {
            let envelope: StatusUpdateEnvelope = serde_json::from_str(&payload)?;
            match broker.publish_status_update(&envelope).await {
                Ok(()) => {
                    self.mark_synced("pending_status_updates", id)?;
                    *flushed += 1;
                }
                Err(err) => dropped += self.record_attempt("pending_status_updates", id, attempts, max_attempts, err)?,
            }
        }
        Ok(dropped)
    }

    async fn sync_logs(&self, broker: &dyn BrokerClient, limit: usize, max_attempts: u32, flushed: &mut usize) -> Result<usize, OutboxError> {
        let rows = self.select_unsynced("pending_logs", limit)?;
        let mut dropped = 0;
        for (id, payload, attempts) in rows {
            let envelope: LogEnvelope = serde_json::from_str(&payload)?;
            match broker.publish_log(&envelope).await {
                Ok(()) => {
                    self.mark_synced("pending_logs", id)?;
                    *flushed += 1;
                }
                Err(err) => dropped += self.record_attempt("pending_logs", id, attempts, max_attempts, err)?,
            }
        }
        Ok(dropped)
    }

    fn select_unsynced(&self, table: &str, limit: usize) -> Result<Vec<(i64, String, u32)>, OutboxError> {
        let conn = self.conn.lock();
        let sql = format!("SELECT id, payload, attempts FROM {table} WHERE synced = 0 ORDER BY id ASC LIMIT ?1");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn mark_synced(&self, table: &str, id: i64) -> Result<(), OutboxError> {
        let sql = format!("UPDATE {table} SET synced = 1 WHERE id = ?1");
        self.conn.lock().execute(&sql, params![id])?;
        Ok(())
    }

    /// Bumps the attempt count; once it crosses `max_attempts`, gives up and
    /// marks the record synced anyway so a permanently-unreachable record
    /// never blocks later ones. Returns 1 if this record was just dropped.
    fn record_attempt(&self, table: &str, id: i64, attempts: u32, max_attempts: u32, err: BrokerError) -> Result<usize, OutboxError> {
        let next_attempts = attempts + 1;
        if next_attempts >= max_attempts {
            tracing::warn!(table, id, error = %err, attempts = next_attempts, "outbox record exceeded max sync retries, dropping");
            self.mark_synced(table, id)?;
            Ok(1)
        } else {
            let sql = format!("UPDATE {table} SET attempts = ?1 WHERE id = ?2");
            self.conn.lock().execute(&sql, params![next_attempts, id])?;
            Ok(0)
        }
    }

    /// Deletes synced records older than `retention`.
    pub fn cleanup(&self, retention: chrono::Duration) -> Result<usize, OutboxError> {
        let cutoff = (Utc::now() - retention).timestamp();
        let conn = self.conn.lock();
        let deleted_updates = conn.execute("DELETE FROM pending_status_updates WHERE synced = 1 AND created_at < ?1", params![cutoff])?;
        let deleted_logs = conn.execute("DELETE FROM pending_logs WHERE synced = 1 AND created_at < ?1", params![cutoff])?;
        Ok(deleted_updates + deleted_logs)
    }

    pub fn pending_count(&self) -> Result<(i64, i64), OutboxError> {
        let conn = self.conn.lock();
        let pending_updates: i64 = conn.query_row("SELECT COUNT(*) FROM pending_status_updates WHERE synced = 0", [], |row| row.get(0))?;
        let pending_logs: i64 = conn.query_row("SELECT COUNT(*) FROM pending_logs WHERE synced = 0", [], |row| row.get(0))?;
        Ok((pending_updates, pending_logs))
    }
}

/// Whether a syncer tick should actually run: gated on the broker connection
/// being healthy. Kept as a free function so the syncer loop and the
/// shutdown flush share the same gating logic.
pub fn should_sync(broker_healthy: bool) -> bool {
    broker_healthy
}

#[cfg(test)]
#[path = "outbox_tests.rs"]
mod tests;
