// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-boundary error enums. Each maps onto [`sched_core::ErrorKind`] for
//! propagation-policy decisions; none of these are surfaced to an operator
//! directly, they drive retry/log/abort choices at the call site.

use sched_adapters::{BrokerError, KvError};
use sched_core::ErrorKind;
use sched_storage::WalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
    #[error("kv error: {0}")]
    Kv(#[from] KvError),
    #[error("wal error: {0}")]
    Wal(#[from] WalError),
    #[error("job {0} not found in cache or store")]
    JobNotFound(String),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Broker(_) | DispatchError::Kv(_) => ErrorKind::Transient,
            DispatchError::Wal(_) => ErrorKind::Transient,
            DispatchError::JobNotFound(_) => ErrorKind::Permanent,
        }
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("wal error: {0}")]
    Wal(#[from] WalError),
    #[error("illegal occurrence transition: {0}")]
    StateViolation(#[from] sched_core::StateViolation),
    #[error("unparseable envelope: {0}")]
    Poisoned(String),
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::Wal(_) => ErrorKind::Transient,
            LifecycleError::StateViolation(_) => ErrorKind::StateViolation,
            LifecycleError::Poisoned(_) => ErrorKind::Poisoned,
        }
    }
}
