// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cancellation bus, subscribe side: the scheduler publishes a
//! Running occurrence's id over the KV pub/sub channel; whichever worker
//! happens to be running that occurrence cancels its local token, and the
//! ordinary status-update path reports back once the handler unwinds.

use parking_lot::Mutex;
use sched_adapters::KvClient;
use sched_core::OccurrenceId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Tracks the occurrences this worker process currently has in flight, so
/// an incoming cancellation message can be routed to the right token.
#[derive(Default, Clone)]
pub struct CancellationRegistry {
    inner: Arc<Mutex<HashMap<OccurrenceId, CancellationToken>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, occurrence_id: OccurrenceId, token: CancellationToken) {
        self.inner.lock().insert(occurrence_id, token);
    }

    pub fn untrack(&self, occurrence_id: &OccurrenceId) {
        self.inner.lock().remove(occurrence_id);
    }

    fn cancel(&self, occurrence_id: &OccurrenceId) -> bool {
        match self.inner.lock().get(occurrence_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Runs until the subscription stream ends or `cancel` fires, forwarding
/// every cancellation message this worker actually has a matching job for.
pub async fn run(kv: &dyn KvClient, registry: CancellationRegistry, cancel: CancellationToken) {
    loop {
        let mut subscription = match kv.subscribe_cancellations().await {
            Ok(subscription) => subscription,
            Err(err) => {
                warn!(error = %err, "failed to subscribe to cancellations, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => continue,
                    _ = cancel.cancelled() => return,
                }
            }
        };

        loop {
            let next = tokio::select! {
                next = subscription.next() => next,
                _ = cancel.cancelled() => return,
            };

            match next {
                Ok(Some(raw)) => {
                    let occurrence_id = OccurrenceId::from_string(&raw);
                    if registry.cancel(&occurrence_id) {
                        debug!(occurrence_id = %occurrence_id, "cancelled locally running occurrence");
                    }
                }
                // No message ready yet. Keep polling the same subscription
                // rather than resubscribing, so a poll-based backend isn't
                // forced to create a fresh subscription on every empty poll.
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {}
                        _ = cancel.cancelled() => return,
                    }
                }
                Err(err) => {
                    warn!(error = %err, "cancellation subscription errored, resubscribing");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "cancellation_tests.rs"]
mod tests;
