// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only write-ahead log of [`Event`]s, newline-delimited JSON.
//!
//! Every mutation to a `ScheduledJob`/`JobOccurrence`/`WorkerRecord` is
//! appended here before the in-memory [`crate::state::MaterializedState`]
//! is updated, so the state can be rebuilt by replaying the log (optionally
//! starting from a [`crate::snapshot`]).

use sched_core::Event;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

const FLUSH_THRESHOLD: usize = 100;
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const MAX_BACKUPS: u32 = 3;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("wal io error at {path:?}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to serialize wal entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl WalError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    pub event: Event,
}

/// A single-writer append-only log, one JSON object per line.
pub struct Wal {
    path: PathBuf,
    file: File,
    write_seq: u64,
    processed_seq: u64,
    next_read_seq: u64,
    unflushed_count: usize,
    last_flush: Instant,
}

impl Wal {
    /// Open (creating if absent) the log at `path`. `processed_seq` is the
    /// highest sequence number already folded into a snapshot; replay via
    /// [`Wal::next_unprocessed`] starts immediately after it.
    ///
    /// If the tail of the file is unparseable (truncated write, corruption),
    /// the valid prefix is kept, the original file is rotated into a
    /// `.bak`/`.bak.2`/`.bak.3` chain (oldest evicted), and the log is
    /// rewritten with only the valid entries.
    pub fn open(path: impl AsRef<Path>, processed_seq: u64) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            File::create(&path).map_err(|e| WalError::io(&path, e))?;
        }

        let scan = Self::scan(&path)?;
        if scan.had_corruption {
            Self::rotate_backups(&path)?;
            fs::copy(&path, path.with_extension("bak")).map_err(|e| WalError::io(&path, e))?;
            Self::rewrite_clean(&path, &scan.entries)?;
        }

        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| WalError::io(&path, e))?;

        Ok(Self {
            path,
            file,
            write_seq: scan.entries.last().map(|e| e.seq).unwrap_or(0),
            processed_seq,
            next_read_seq: processed_seq + 1,
            unflushed_count: 0,
            last_flush: Instant::now(),
        })
    }

    /// Append an event, returning its assigned sequence number. Not
    /// guaranteed durable until [`Wal::flush`].
    pub fn append(&mut self, event: &Event) -> Result<u64, WalError> {
        let seq = self.write_seq + 1;
        let entry = WalEntry { seq, event: event.clone() };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        self.file.write_all(line.as_bytes()).map_err(|e| WalError::io(&self.path, e))?;
        self.write_seq = seq;
        self.unflushed_count += 1;
        Ok(seq)
    }

    pub fn flush(&mut self) -> Result<(), WalError> {
        self.file.sync_data().map_err(|e| WalError::io(&self.path, e))?;
        self.unflushed_count = 0;
        self.last_flush = Instant::now();
        Ok(())
    }

    /// Whether enough unflushed writes (or enough time) have accumulated
    /// that the caller should flush before continuing.
    pub fn needs_flush(&self) -> bool {
        self.unflushed_count >= FLUSH_THRESHOLD || self.last_flush.elapsed() >= FLUSH_INTERVAL
    }

    /// Returns the next entry after the last one returned by this call (or
    /// after `processed_seq` on first call), or `None` at end-of-log or on
    /// encountering a corrupt trailing entry (corruption is never surfaced
    /// as an error here — the writer is expected to call [`Wal::open`]
    /// again to clean it up).
    pub fn next_unprocessed(&mut self) -> Result<Option<WalEntry>, WalError> {
        let scan = Self::scan(&self.path)?;
        let next = scan.entries.into_iter().find(|e| e.seq == self.next_read_seq);
        if let Some(entry) = &next {
            self.next_read_seq = entry.seq + 1;
        }
        Ok(next)
    }

    pub fn mark_processed(&mut self, seq: u64) {
        if seq > self.processed_seq {
            self.processed_seq = seq;
        }
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }

    /// All valid entries with `seq > after`, in order. Stops at the first
    /// corrupt or truncated line rather than erroring.
    pub fn entries_after(&self, after: u64) -> Result<Vec<WalEntry>, WalError> {
        let scan = Self::scan(&self.path)?;
        Ok(scan.entries.into_iter().filter(|e| e.seq > after).collect())
    }

    /// Drop all entries with `seq < keep_from` from the log. Used after a
    /// snapshot has absorbed them.
    pub fn truncate_before(&mut self, keep_from: u64) -> Result<(), WalError> {
        let scan = Self::scan(&self.path)?;
        let kept: Vec<WalEntry> = scan.entries.into_iter().filter(|e| e.seq >= keep_from).collect();
        Self::rewrite_clean(&self.path, &kept)?;
        self.file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| WalError::io(&self.path, e))?;
        Ok(())
    }

    fn scan(path: &Path) -> Result<ScanResult, WalError> {
        let file = File::open(path).map_err(|e| WalError::io(path, e))?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut had_corruption = false;

        for raw in reader.split(b'\n') {
            let raw = raw.map_err(|e| WalError::io(path, e))?;
            if raw.is_empty() {
                continue;
            }
            let line = match std::str::from_utf8(&raw) {
                Ok(line) => line,
                Err(_) => {
                    had_corruption = true;
                    break;
                }
            };
            match serde_json::from_str::<WalEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(_) => {
                    had_corruption = true;
                    break;
                }
            }
        }

        Ok(ScanResult { entries, had_corruption })
    }

    fn rewrite_clean(path: &Path, entries: &[WalEntry]) -> Result<(), WalError> {
        let mut file = File::create(path).map_err(|e| WalError::io(path, e))?;
        for entry in entries {
            let mut line = serde_json::to_string(entry)?;
            line.push('\n');
            file.write_all(line.as_bytes()).map_err(|e| WalError::io(path, e))?;
        }
        file.sync_data().map_err(|e| WalError::io(path, e))?;
        Ok(())
    }

    /// Shift `.bak` -> `.bak.2` -> `.bak.3`, evicting whatever was in the
    /// oldest slot (`MAX_BACKUPS` generations are kept in total).
    fn rotate_backups(path: &Path) -> Result<(), WalError> {
        let oldest = backup_path(path, MAX_BACKUPS);
        let _ = fs::remove_file(&oldest);
        for generation in (1..MAX_BACKUPS).rev() {
            let from = backup_path(path, generation);
            let to = backup_path(path, generation + 1);
            if from.exists() {
                fs::rename(&from, &to).map_err(|e| WalError::io(path, e))?;
            }
        }
        Ok(())
    }
}

struct ScanResult {
    entries: Vec<WalEntry>,
    had_corruption: bool,
}

fn backup_path(path: &Path, generation: u32) -> PathBuf {
    if generation <= 1 {
        path.with_extension("bak")
    } else {
        path.with_extension(format!("bak.{generation}"))
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
