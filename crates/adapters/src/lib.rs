// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External-system clients for the scheduler and worker: a broker client, a
//! KV/coordination client, and the circuit breaker that wraps both. Real
//! implementations (`LapinBroker`, `RedisKv`) sit behind the same traits as
//! their `test-support` fakes.

pub mod broker;
pub mod circuit;
pub mod guarded;
pub mod kv;

pub use broker::{BrokerClient, BrokerError, JobConsumer, JobDelivery, RawConsumer, RawDelivery};
pub use circuit::{BreakerState, CircuitBreaker, CircuitBreakerConfig, CircuitError};
pub use guarded::{GuardedBroker, GuardedKv};
pub use kv::{CancellationSubscription, KvClient, KvError, LockToken};
