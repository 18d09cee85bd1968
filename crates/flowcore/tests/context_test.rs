// crates/flowcore/tests/context_test.rs

use flowcore::{Context, Emission, Event, ProgressEmitter, ProgressKind, RunId, RunScope, StepError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, PartialEq)]
enum Ping {
    Ping(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PingTag {
    Ping,
}

impl Event for Ping {
    type Tag = PingTag;

    fn tag(&self) -> PingTag {
        PingTag::Ping
    }
}

/// Initialize tracing for tests
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

fn create_test_scope() -> (
    RunScope<Ping>,
    mpsc::UnboundedReceiver<Emission<Ping>>,
    tokio::sync::broadcast::Receiver<flowcore::ProgressEvent>,
) {
    let (events, emissions) = mpsc::unbounded_channel();
    let (progress, receiver) = ProgressEmitter::channel(RunId::new_v4(), 64);
    let scope = RunScope::new(events, progress, CancellationToken::new());
    (scope, emissions, receiver)
}

fn create_test_context() -> (
    Context<Ping>,
    mpsc::UnboundedReceiver<Emission<Ping>>,
    tokio::sync::broadcast::Receiver<flowcore::ProgressEvent>,
) {
    let (scope, emissions, receiver) = create_test_scope();
    (scope.context("test"), emissions, receiver)
}

#[tokio::test]
async fn test_get_before_set_is_missing_key() {
    init_tracing();
    let (ctx, _emissions, _progress) = create_test_context();

    let err = ctx.get("k").await.unwrap_err();
    assert_eq!(err, StepError::MissingKey("k".to_string()));
    assert!(!ctx.contains("k").await);
}

#[tokio::test]
async fn test_set_then_get_typed_and_overwrite() {
    let (ctx, _emissions, _progress) = create_test_context();

    ctx.set("draft", "hello @[entity1]").await.unwrap();
    let draft: String = ctx.get_as("draft").await.unwrap();
    assert_eq!(draft, "hello @[entity1]");

    ctx.set("draft", "second").await.unwrap();
    assert_eq!(ctx.get("draft").await.unwrap(), serde_json::json!("second"));

    let err = ctx.get_as::<u64>("draft").await.unwrap_err();
    assert!(matches!(err, StepError::InvalidValue { key, .. } if key == "draft"));
}

#[tokio::test]
async fn test_step_clones_share_the_store() {
    let (scope, _emissions, _progress) = create_test_scope();
    let ctx = scope.context("reader");

    let mut tasks = Vec::new();
    for i in 0..16u32 {
        let step_ctx = scope.context(&format!("writer-{}", i));
        tasks.push(tokio::spawn(async move {
            step_ctx.set(format!("key-{}", i), i).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let snapshot = ctx.snapshot().await;
    assert_eq!(snapshot.len(), 16);
    for i in 0..16u32 {
        let value: u32 = ctx.get_as(&format!("key-{}", i)).await.unwrap();
        assert_eq!(value, i);
    }
}

#[tokio::test]
async fn test_emit_progress_is_attributed_and_ordered() {
    let (scope, _emissions, mut progress) = create_test_scope();
    let step_ctx = scope.context("lookup");

    step_ctx.emit_progress("first");
    step_ctx.emit_progress("second");

    for expected in ["first", "second"] {
        let event = progress.recv().await.unwrap();
        assert_eq!(event.run_id, scope.run_id());
        assert_eq!(
            event.kind,
            ProgressKind::Message {
                step: "lookup".to_string(),
                message: expected.to_string(),
            }
        );
    }
}

#[tokio::test]
async fn test_send_event_carries_source_step() {
    let (scope, mut emissions, _progress) = create_test_scope();
    let ctx = scope.context("extract");

    ctx.send_event(Ping::Ping(1)).unwrap();
    ctx.clone().send_event(Ping::Ping(2)).unwrap();

    let first = emissions.recv().await.unwrap();
    let second = emissions.recv().await.unwrap();
    assert_eq!(first.source, "extract");
    assert_eq!(first.event, Ping::Ping(1));
    assert_eq!(second.source, "extract");
    assert_eq!(second.event, Ping::Ping(2));

    drop(emissions);
    assert_eq!(ctx.send_event(Ping::Ping(3)).unwrap_err(), StepError::RunClosed);
}

#[tokio::test]
async fn test_cancellable_stops_at_cancellation() {
    let (ctx, _emissions, _progress) = create_test_context();
    assert!(ctx.checkpoint().is_ok());

    let token = ctx.cancellation().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let result = ctx
        .cancellable(tokio::time::sleep(Duration::from_secs(10)))
        .await;
    assert_eq!(result.unwrap_err(), StepError::Cancelled);
    assert!(ctx.is_cancelled());
    assert_eq!(ctx.checkpoint().unwrap_err(), StepError::Cancelled);
}

#[tokio::test]
async fn test_progress_without_listener_does_not_block() {
    let (ctx, _emissions, progress) = create_test_context();
    drop(progress);

    for i in 0..1000 {
        ctx.emit_progress(format!("message {}", i));
    }
}

#[tokio::test]
async fn test_step_label_is_fixed_per_context() {
    let (scope, mut emissions, _progress) = create_test_scope();
    let lookup = scope.context("lookup");
    let collect = scope.context("collect");

    lookup.set("shared", 1u32).await.unwrap();
    assert_eq!(collect.get_as::<u32>("shared").await.unwrap(), 1);

    let cloned = lookup.clone();
    assert_eq!(cloned.step(), "lookup");
    assert_eq!(cloned.run_id(), collect.run_id());

    cloned.send_event(Ping::Ping(7)).unwrap();
    collect.send_event(Ping::Ping(8)).unwrap();
    assert_eq!(emissions.recv().await.unwrap().source, "lookup");
    assert_eq!(emissions.recv().await.unwrap().source, "collect");
}
