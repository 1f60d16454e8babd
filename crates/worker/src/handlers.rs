// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler registration: one trait per job handler, typed over
//! its own payload, erased into a common object-safe form so the runtime
//! can hold a `name -> handler` map without knowing every payload type.
//!
//! The spec's four handler variants (void/result-returning crossed with
//! blocking/cancellable) collapse to one trait method here: Rust futures
//! are cancelled by being dropped at their next await point regardless of
//! whether a handler polls its cancellation token, so "blocking" and
//! "cancellable" are the same code path with different handler-internal
//! behaviour, not different runtime branches.

use crate::context::JobContext;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("payload does not match the handler's expected shape: {0}")]
    InvalidPayload(String),
    #[error("permanent failure: {0}")]
    Permanent(String),
    #[error("{0}")]
    Transient(String),
}

/// A single job handler, typed over its own expected payload shape.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    type Payload: DeserializeOwned + Send + 'static;

    async fn run(&self, ctx: &JobContext, payload: Self::Payload) -> Result<Option<String>, HandlerError>;

    /// Informational only: whether this handler actually polls
    /// `ctx.cancellation_token` rather than ignoring it. Carried into the
    /// worker registration envelope for observability; cancellation itself
    /// works the same way either way (see module docs).
    fn cancellable(&self) -> bool {
        false
    }
}

#[async_trait]
pub trait ErasedHandler: Send + Sync {
    async fn dispatch(&self, ctx: &JobContext, raw_payload: &str) -> Result<Option<String>, HandlerError>;
    fn cancellable(&self) -> bool;
}

struct Erased<H>(H);

#[async_trait]
impl<H: JobHandler> ErasedHandler for Erased<H> {
    async fn dispatch(&self, ctx: &JobContext, raw_payload: &str) -> Result<Option<String>, HandlerError> {
        let text = if raw_payload.trim().is_empty() { "null" } else { raw_payload };
        let payload: H::Payload = serde_json::from_str(text).map_err(|err| HandlerError::InvalidPayload(err.to_string()))?;
        self.0.run(ctx, payload).await
    }

    fn cancellable(&self) -> bool {
        self.0.cancellable()
    }
}

/// `name -> handler` map built once at worker startup.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Box<dyn ErasedHandler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry").field("handlers", &self.handlers.keys().collect::<Vec<_>>()).finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: JobHandler>(&mut self, name: impl Into<String>, handler: H) {
        self.handlers.insert(name.into(), Box::new(Erased(handler)));
    }

    pub fn get(&self, name: &str) -> Option<&dyn ErasedHandler> {
        self.handlers.get(name).map(|b| b.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(|s| s.as_str())
    }
}

/// Handlers shipped with the worker binary itself, as opposed to ones an
/// embedder registers.
pub mod built_in {
    use super::{HandlerError, JobHandler};
    use crate::context::JobContext;
    use async_trait::async_trait;

    /// Always succeeds without doing anything; useful as a liveness probe
    /// job and as the worker's one handler when no others are configured.
    pub struct NoopHandler;

    #[async_trait]
    impl JobHandler for NoopHandler {
        type Payload = ();

        async fn run(&self, _ctx: &JobContext, _payload: Self::Payload) -> Result<Option<String>, HandlerError> {
            Ok(None)
        }
    }
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
