use super::*;
use crate::outbox::Outbox;
use sched_core::{JobId, OccurrenceId, WorkerId};
use serde::Deserialize;
use std::sync::Arc;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Deserialize)]
struct GreetPayload {
    name: String,
}

struct GreetHandler;

#[async_trait]
impl JobHandler for GreetHandler {
    type Payload = GreetPayload;

    async fn run(&self, _ctx: &JobContext, payload: Self::Payload) -> Result<Option<String>, HandlerError> {
        Ok(Some(format!("hello, {}", payload.name)))
    }
}

struct VoidHandler;

#[async_trait]
impl JobHandler for VoidHandler {
    type Payload = ();

    async fn run(&self, _ctx: &JobContext, _payload: Self::Payload) -> Result<Option<String>, HandlerError> {
        Ok(None)
    }
}

struct CancellableHandler;

#[async_trait]
impl JobHandler for CancellableHandler {
    type Payload = ();

    async fn run(&self, ctx: &JobContext, _payload: Self::Payload) -> Result<Option<String>, HandlerError> {
        ctx.cancellation_token.cancelled().await;
        Err(HandlerError::Transient("cancelled mid-flight".into()))
    }

    fn cancellable(&self) -> bool {
        true
    }
}

fn test_ctx() -> JobContext {
    let dir = tempdir().expect("tempdir");
    let outbox = Arc::new(Outbox::open(dir.path().join("outbox.sqlite")).expect("open outbox"));
    JobContext::new(JobId::new(), OccurrenceId::new(), WorkerId::new(), 1, CancellationToken::new(), outbox)
}

#[tokio::test]
async fn registered_handler_dispatches_with_typed_payload() {
    let mut registry = HandlerRegistry::new();
    registry.register("greet", GreetHandler);
    let handler = registry.get("greet").expect("registered");
    let ctx = test_ctx();

    let result = handler.dispatch(&ctx, r#"{"name":"ada"}"#).await.expect("dispatch");

    assert_eq!(result, Some("hello, ada".to_string()));
}

#[tokio::test]
async fn empty_payload_deserializes_as_null_for_unit_payload_handlers() {
    let mut registry = HandlerRegistry::new();
    registry.register("noop", VoidHandler);
    let handler = registry.get("noop").expect("registered");
    let ctx = test_ctx();

    let result = handler.dispatch(&ctx, "").await.expect("dispatch");

    assert_eq!(result, None);
}

#[tokio::test]
async fn malformed_payload_is_reported_as_invalid_payload() {
    let mut registry = HandlerRegistry::new();
    registry.register("greet", GreetHandler);
    let handler = registry.get("greet").expect("registered");
    let ctx = test_ctx();

    let err = handler.dispatch(&ctx, "not json").await.expect_err("should fail");

    assert!(matches!(err, HandlerError::InvalidPayload(_)));
}

#[test]
fn cancellable_flag_is_carried_through_erasure() {
    let mut registry = HandlerRegistry::new();
    registry.register("greet", GreetHandler);
    registry.register("cancellable", CancellableHandler);

    assert!(!registry.get("greet").expect("registered").cancellable());
    assert!(registry.get("cancellable").expect("registered").cancellable());
}

#[test]
fn names_lists_every_registered_handler() {
    let mut registry = HandlerRegistry::new();
    registry.register("greet", GreetHandler);
    registry.register("noop", VoidHandler);

    let mut names: Vec<&str> = registry.names().collect();
    names.sort();
    assert_eq!(names, vec!["greet", "noop"]);
}
