// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sched-scheduler: the scheduler-side dispatch and lifecycle engine (spec
//! §4 C-J). Persistence is `sched-storage`, external I/O is `sched-
//! adapters`; this crate is the business logic sitting between the two.

pub mod auto_disable;
pub mod cancellation;
pub mod dispatcher;
pub mod due_set;
pub mod engine;
pub mod errors;
pub mod lifecycle;
pub mod notify;
pub mod registry;
pub mod retry;
pub mod zombie;

pub use auto_disable::AutoDisableController;
pub use cancellation::CancellationBus;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use engine::SchedulerEngine;
pub use errors::{DispatchError, LifecycleError};
pub use lifecycle::OccurrenceLifecycle;
pub use notify::{LoggingNotificationSink, NotificationSink};
pub use registry::WorkerRegistry;
pub use retry::{RetryDecision, RetryPolicies};
pub use zombie::ZombieDetector;
