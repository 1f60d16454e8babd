// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cron schedule parsing, six-field (seconds-first), UTC.

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CronError {
    #[error("invalid cron expression {expr:?}: {source}")]
    Parse { expr: String, #[source] source: cron::error::Error },
    #[error("cron expression {expr:?} has a sub-1-second interval, which is rejected")]
    SubSecondInterval { expr: String },
}

/// A validated, parsed cron schedule.
///
/// Wraps the `cron` crate's six-field parser (seconds field first). The
/// engine rejects any expression whose minimum interval, measured by
/// sampling consecutive fire times, is under one second. Sub-1-minute
/// intervals are permitted but not rejected; see DESIGN.md for the
/// rationale.
#[derive(Debug, Clone)]
pub struct Schedule {
    expr: String,
    inner: CronSchedule,
}

impl Schedule {
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let inner = CronSchedule::from_str(expr).map_err(|source| CronError::Parse {
            expr: expr.to_string(),
            source,
        })?;

        let schedule = Self { expr: expr.to_string(), inner };
        schedule.reject_sub_second_interval()?;
        Ok(schedule)
    }

    fn reject_sub_second_interval(&self) -> Result<(), CronError> {
        let epoch = DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_else(Utc::now);
        let mut times = self.inner.after(&epoch).take(3);
        if let (Some(first), Some(second)) = (times.next(), times.next()) {
            if (second - first).num_milliseconds() < 1000 {
                return Err(CronError::SubSecondInterval { expr: self.expr.clone() });
            }
        }
        Ok(())
    }

    /// Next fire time strictly after `from`.
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.inner.after(&from).next()
    }

    pub fn as_str(&self) -> &str {
        &self.expr
    }
}

impl PartialEq for Schedule {
    fn eq(&self, other: &Self) -> bool {
        self.expr == other.expr
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.expr)
    }
}

impl serde::Serialize for Schedule {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.expr)
    }
}

impl<'de> serde::Deserialize<'de> for Schedule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let expr = String::deserialize(deserializer)?;
        Schedule::parse(&expr).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "cron_tests.rs"]
mod tests;
