use super::*;
use sched_adapters::FakeKv;
use std::time::Duration;

#[test]
fn untracked_occurrence_cancel_is_a_no_op() {
    let registry = CancellationRegistry::new();
    let occurrence_id = OccurrenceId::new();
    assert!(!registry.cancel(&occurrence_id));
}

#[test]
fn tracked_occurrence_is_cancelled_and_then_untracked() {
    let registry = CancellationRegistry::new();
    let occurrence_id = OccurrenceId::new();
    let token = CancellationToken::new();
    registry.track(occurrence_id, token.clone());

    assert!(registry.cancel(&occurrence_id));
    assert!(token.is_cancelled());

    registry.untrack(&occurrence_id);
    assert!(!registry.cancel(&occurrence_id));
}

#[tokio::test]
async fn running_occurrence_is_cancelled_when_a_message_arrives() {
    let kv = FakeKv::new();
    let registry = CancellationRegistry::new();
    let token = CancellationToken::new();
    let occurrence_id = OccurrenceId::new();
    registry.track(occurrence_id, token.clone());

    let shutdown = CancellationToken::new();
    let shutdown_for_run = shutdown.clone();
    let run_fut = run(&kv, registry, shutdown_for_run);

    let driver_fut = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        kv.publish_cancellation(&occurrence_id.to_string()).await.expect("publish");
        for _ in 0..100 {
            if token.is_cancelled() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.cancel();
    };

    tokio::join!(run_fut, driver_fut);
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn cancellation_for_an_untracked_occurrence_is_ignored() {
    let kv = FakeKv::new();
    let registry = CancellationRegistry::new();
    let shutdown = CancellationToken::new();
    let shutdown_for_run = shutdown.clone();
    let run_fut = run(&kv, registry, shutdown_for_run);

    let driver_fut = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        kv.publish_cancellation("occ-unknown").await.expect("publish");
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
    };

    tokio::join!(run_fut, driver_fut);
}
