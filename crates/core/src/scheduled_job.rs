// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `ScheduledJob` entity.

use crate::cron::Schedule;
use crate::ids::{JobId, WorkerId};
use crate::policy::ConcurrencyPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-job auto-disable accounting. `None` fields fall back to
/// the global auto-disable configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoDisableSettings {
    pub enabled: Option<bool>,
    pub threshold: Option<u32>,
    #[serde(default)]
    pub consecutive_failures: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
}

/// Configuration for creating a new scheduled job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJobConfig {
    pub display_name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub worker_id: WorkerId,
    pub handler_name: String,
    pub payload: String,
    pub next_fire_at: Option<DateTime<Utc>>,
    pub cron: Option<Schedule>,
    pub concurrency_policy: ConcurrencyPolicy,
    pub zombie_timeout_minutes: Option<u32>,
    pub execution_timeout_seconds: Option<i64>,
}

impl ScheduledJobConfig {
    pub fn builder(
        display_name: impl Into<String>,
        worker_id: WorkerId,
        handler_name: impl Into<String>,
    ) -> ScheduledJobConfigBuilder {
        ScheduledJobConfigBuilder {
            display_name: display_name.into(),
            description: String::new(),
            tags: Vec::new(),
            worker_id,
            handler_name: handler_name.into(),
            payload: String::new(),
            next_fire_at: None,
            cron: None,
            concurrency_policy: ConcurrencyPolicy::default(),
            zombie_timeout_minutes: None,
            execution_timeout_seconds: None,
        }
    }
}

pub struct ScheduledJobConfigBuilder {
    display_name: String,
    description: String,
    tags: Vec<String>,
    worker_id: WorkerId,
    handler_name: String,
    payload: String,
    next_fire_at: Option<DateTime<Utc>>,
    cron: Option<Schedule>,
    concurrency_policy: ConcurrencyPolicy,
    zombie_timeout_minutes: Option<u32>,
    execution_timeout_seconds: Option<i64>,
}

impl ScheduledJobConfigBuilder {
    crate::setters! {
        into {
            description: String,
            payload: String,
        }
        set {
            tags: Vec<String>,
            concurrency_policy: ConcurrencyPolicy,
        }
        option {
            next_fire_at: DateTime<Utc>,
            cron: Schedule,
            zombie_timeout_minutes: u32,
            execution_timeout_seconds: i64,
        }
    }

    pub fn build(self) -> ScheduledJobConfig {
        ScheduledJobConfig {
            display_name: self.display_name,
            description: self.description,
            tags: self.tags,
            worker_id: self.worker_id,
            handler_name: self.handler_name,
            payload: self.payload,
            next_fire_at: self.next_fire_at,
            cron: self.cron,
            concurrency_policy: self.concurrency_policy,
            zombie_timeout_minutes: self.zombie_timeout_minutes,
            execution_timeout_seconds: self.execution_timeout_seconds,
        }
    }
}

/// Every field that `update_job` may change; absent means unchanged. One
/// `Option<T>` per mutable field, so an absent field is distinguishable from
/// one explicitly cleared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduledJobUpdate {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub worker_id: Option<WorkerId>,
    pub handler_name: Option<String>,
    pub payload: Option<String>,
    pub next_fire_at: Option<Option<DateTime<Utc>>>,
    pub cron: Option<Option<Schedule>>,
    pub active: Option<bool>,
    pub concurrency_policy: Option<ConcurrencyPolicy>,
    pub zombie_timeout_minutes: Option<Option<u32>>,
    pub execution_timeout_seconds: Option<Option<i64>>,
}

impl ScheduledJobUpdate {
    /// Whether this update touches a field the version bump is gated on:
    /// handler, payload, or cron.
    pub fn bumps_version(&self) -> bool {
        self.handler_name.is_some() || self.payload.is_some() || self.cron.is_some()
    }
}

/// A job definition driving dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: JobId,
    pub display_name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub worker_id: WorkerId,
    pub handler_name: String,
    pub payload: String,
    pub next_fire_at: Option<DateTime<Utc>>,
    pub cron: Option<Schedule>,
    pub active: bool,
    pub concurrency_policy: ConcurrencyPolicy,
    pub zombie_timeout_minutes: Option<u32>,
    pub execution_timeout_seconds: Option<i64>,
    pub version: u32,
    #[serde(default)]
    pub history: Vec<ScheduledJobSnapshot>,
    #[serde(default)]
    pub auto_disable: AutoDisableSettings,
}

/// A serialized prior version, kept for the version history invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJobSnapshot {
    pub version: u32,
    pub snapshot: String,
}

impl ScheduledJob {
    pub fn new(id: JobId, config: ScheduledJobConfig) -> Self {
        Self {
            id,
            display_name: config.display_name,
            description: config.description,
            tags: config.tags,
            worker_id: config.worker_id,
            handler_name: config.handler_name,
            payload: config.payload,
            next_fire_at: config.next_fire_at,
            cron: config.cron,
            active: true,
            concurrency_policy: config.concurrency_policy,
            zombie_timeout_minutes: config.zombie_timeout_minutes,
            execution_timeout_seconds: config.execution_timeout_seconds,
            version: 1,
            history: Vec::new(),
            auto_disable: AutoDisableSettings::default(),
        }
    }

    /// At least one of next-fire or cron must be defined.
    pub fn has_schedule(&self) -> bool {
        self.next_fire_at.is_some() || self.cron.is_some()
    }

    /// Payload must be valid JSON or empty.
    pub fn has_valid_payload(&self) -> bool {
        self.payload.is_empty() || serde_json::from_str::<serde_json::Value>(&self.payload).is_ok()
    }

    /// Apply an update, bumping the version and snapshotting the prior state
    /// only when a version-bumping field (handler, payload, cron) changes.
    pub fn apply_update(&mut self, update: ScheduledJobUpdate, snapshot: impl FnOnce() -> String) {
        let bumps_version = update.bumps_version();

        if let Some(v) = update.display_name {
            self.display_name = v;
        }
        if let Some(v) = update.description {
            self.description = v;
        }
        if let Some(v) = update.tags {
            self.tags = v;
        }
        if let Some(v) = update.worker_id {
            self.worker_id = v;
        }
        if let Some(v) = update.handler_name {
            self.handler_name = v;
        }
        if let Some(v) = update.payload {
            self.payload = v;
        }
        if let Some(v) = update.next_fire_at {
            self.next_fire_at = v;
        }
        if let Some(v) = update.cron {
            self.cron = v;
        }
        if let Some(v) = update.active {
            self.active = v;
        }
        if let Some(v) = update.concurrency_policy {
            self.concurrency_policy = v;
        }
        if let Some(v) = update.zombie_timeout_minutes {
            self.zombie_timeout_minutes = v;
        }
        if let Some(v) = update.execution_timeout_seconds {
            self.execution_timeout_seconds = v;
        }

        if bumps_version {
            self.history.push(ScheduledJobSnapshot { version: self.version, snapshot: snapshot() });
            self.version += 1;
        }
    }

    /// Record a failed/timed-out terminal outcome against the auto-disable
    /// counter. Returns `true` if this failure pushed the job over the
    /// threshold (caller is responsible for deactivating it). `default_enabled`
    /// /`default_threshold` are the global `autoDisable` config values a
    /// per-job setting of `None` falls back to.
    pub fn record_failure(&mut self, now: DateTime<Utc>, default_enabled: bool, default_threshold: u32) -> bool {
        self.auto_disable.consecutive_failures += 1;
        self.auto_disable.last_failure_time = Some(now);
        let threshold = self.auto_disable.threshold.unwrap_or(default_threshold);
        self.auto_disable.enabled.unwrap_or(default_enabled) && self.auto_disable.consecutive_failures >= threshold
    }

    /// A Completed terminal event resets the consecutive-failure counter.
    pub fn record_success(&mut self) {
        self.auto_disable.consecutive_failures = 0;
    }
}

crate::builder! {
    pub struct ScheduledJobBuilder => ScheduledJob {
        set {
            id: JobId = JobId::new(),
            display_name: String = String::from("test-job"),
            description: String = String::new(),
            tags: Vec<String> = Vec::new(),
            worker_id: WorkerId = WorkerId::new(),
            handler_name: String = String::from("noop"),
            payload: String = String::new(),
            next_fire_at: Option<DateTime<Utc>> = None,
            cron: Option<Schedule> = None,
            active: bool = true,
            concurrency_policy: ConcurrencyPolicy = ConcurrencyPolicy::Skip,
            zombie_timeout_minutes: Option<u32> = None,
            execution_timeout_seconds: Option<i64> = None,
            version: u32 = 1,
            history: Vec<ScheduledJobSnapshot> = Vec::new(),
            auto_disable: AutoDisableSettings = AutoDisableSettings::default(),
        }
    }
}

#[cfg(test)]
#[path = "scheduled_job_tests.rs"]
mod tests;
