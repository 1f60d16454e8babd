// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The circuit breaker wrapping both the broker and KV clients.
//!
//! Closed -> Open after `failure_threshold` consecutive failures inside
//! `window`; Open rejects every call immediately until `cooldown` has
//! elapsed, then admits exactly one probe (HalfOpen); the probe's outcome
//! decides Closed (success) or Open again (failure).

use parking_lot::Mutex;
use sched_core::Clock;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        })
    }
}

#[derive(Debug, Error)]
pub enum CircuitError<E> {
    #[error("circuit breaker is open, rejecting fast")]
    Open,
    #[error(transparent)]
    Inner(E),
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub window: Duration,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, window: Duration::from_secs(30), cooldown: Duration::from_secs(15) }
    }
}

enum Inner {
    Closed,
    Open { opened_at: Instant },
    HalfOpen { probe_in_flight: bool },
}

/// Wraps any fallible async operation with the Closed/Open/HalfOpen state
/// machine. Generic over [`Clock`] so breaker timing tests don't sleep in
/// wall-clock time.
pub struct CircuitBreaker<C: Clock> {
    config: CircuitBreakerConfig,
    state: Mutex<Inner>,
    failures: Mutex<VecDeque<Instant>>,
    total_ops: AtomicU64,
    total_successes: AtomicU64,
    clock: C,
}

impl<C: Clock> CircuitBreaker<C> {
    pub fn new(config: CircuitBreakerConfig, clock: C) -> Self {
        Self {
            config,
            state: Mutex::new(Inner::Closed),
            failures: Mutex::new(VecDeque::new()),
            total_ops: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            clock,
        }
    }

    pub fn state(&self) -> BreakerState {
        match *self.state.lock() {
            Inner::Closed => BreakerState::Closed,
            Inner::Open { .. } => BreakerState::Open,
            Inner::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }

    pub fn failure_count(&self) -> usize {
        self.failures.lock().len()
    }

    pub fn total_ops(&self) -> u64 {
        self.total_ops.load(Ordering::Relaxed)
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.total_ops.load(Ordering::Relaxed);
        if total == 0 {
            return 1.0;
        }
        self.total_successes.load(Ordering::Relaxed) as f64 / total as f64
    }

    /// Run `op`, counting it against the breaker. Returns [`CircuitError::Open`]
    /// without running `op` at all when the breaker is Open and the cooldown
    /// hasn't elapsed, or when it's Open/HalfOpen and a probe is already in
    /// flight.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.admit() {
            return Err(CircuitError::Open);
        }

        self.total_ops.fetch_add(1, Ordering::Relaxed);
        match op().await {
            Ok(value) => {
                self.total_successes.fetch_add(1, Ordering::Relaxed);
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(CircuitError::Inner(err))
            }
        }
    }

    /// Whether a call may proceed right now. Transitions Open -> HalfOpen
    /// when the cooldown has elapsed.
    fn admit(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            Inner::Closed => true,
            Inner::Open { opened_at } => {
                if self.clock.now().duration_since(opened_at) >= self.config.cooldown {
                    *state = Inner::HalfOpen { probe_in_flight: true };
                    true
                } else {
                    false
                }
            }
            Inner::HalfOpen { probe_in_flight } => {
                if probe_in_flight {
                    false
                } else {
                    *state = Inner::HalfOpen { probe_in_flight: true };
                    true
                }
            }
        }
    }

    fn on_success(&self) {
        let mut state = self.state.lock();
        match *state {
            Inner::HalfOpen { .. } => {
                *state = Inner::Closed;
                self.failures.lock().clear();
            }
            Inner::Closed => {
                self.prune_window();
            }
            Inner::Open { .. } => {}
        }
    }

    fn on_failure(&self) {
        let now = self.clock.now();
        {
            let mut failures = self.failures.lock();
            failures.push_back(now);
            while let Some(&front) = failures.front() {
                if now.duration_since(front) > self.config.window {
                    failures.pop_front();
                } else {
                    break;
                }
            }
        }

        let mut state = self.state.lock();
        match *state {
            Inner::HalfOpen { .. } => {
                *state = Inner::Open { opened_at: now };
            }
            Inner::Closed => {
                if self.failures.lock().len() as u32 >= self.config.failure_threshold {
                    *state = Inner::Open { opened_at: now };
                }
            }
            Inner::Open { .. } => {}
        }
    }

    fn prune_window(&self) {
        let now = self.clock.now();
        let mut failures = self.failures.lock();
        while let Some(&front) = failures.front() {
            if now.duration_since(front) > self.config.window {
                failures.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
#[path = "circuit_tests.rs"]
mod tests;
