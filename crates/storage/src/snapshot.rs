// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Zstd-compressed point-in-time dumps of [`MaterializedState`], so a
//! cold start doesn't have to replay the whole log from sequence zero.

use crate::state::MaterializedState;
use crate::wal::WalError;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Wal(#[from] WalError),
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to (de)serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// What a loaded snapshot carries: the folded state plus the WAL sequence
/// number it was folded up to, so the caller knows where to resume replay.
pub struct LoadedSnapshot {
    pub state: MaterializedState,
    pub up_to_seq: u64,
}

pub fn write(path: impl AsRef<Path>, state: &MaterializedState, up_to_seq: u64) -> Result<(), SnapshotError> {
    let file = File::create(path.as_ref())?;
    let mut encoder = zstd::Encoder::new(BufWriter::new(file), ZSTD_LEVEL)?;
    serde_json::to_writer(&mut encoder, &(up_to_seq, state))?;
    encoder.finish()?;
    Ok(())
}

pub fn load(path: impl AsRef<Path>) -> Result<Option<LoadedSnapshot>, SnapshotError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(path)?;
    let decoder = zstd::Decoder::new(BufReader::new(file))?;
    let (up_to_seq, state): (u64, MaterializedState) = serde_json::from_reader(decoder)?;
    Ok(Some(LoadedSnapshot { state, up_to_seq }))
}
