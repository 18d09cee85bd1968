// crates/flowruntime/tests/common/mod.rs
#![allow(dead_code)]

use flowcore::{Context, Event, FnStep, Step, StepError, StepOutput};
use flowruntime::{JoinDef, StepRegistry, Workflow};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Ev {
    Start(String),
    A(u64),
    B(u64),
    Ready { platform: String, value: i64 },
    Collected(Vec<(String, i64)>),
    X,
    Stop(serde_json::Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Start,
    A,
    B,
    Ready,
    Collected,
    X,
    Stop,
}

impl Event for Ev {
    type Tag = Tag;

    fn tag(&self) -> Tag {
        match self {
            Ev::Start(_) => Tag::Start,
            Ev::A(_) => Tag::A,
            Ev::B(_) => Tag::B,
            Ev::Ready { .. } => Tag::Ready,
            Ev::Collected(_) => Tag::Collected,
            Ev::X => Tag::X,
            Ev::Stop(_) => Tag::Stop,
        }
    }
}

pub fn step<F>(
    name: &str,
    accepts: impl IntoIterator<Item = Tag>,
    produces: impl IntoIterator<Item = Tag>,
    handler: F,
) -> Arc<dyn Step<Ev>>
where
    F: Fn(Context<Ev>, Ev) -> BoxFuture<'static, Result<StepOutput<Ev>, StepError>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnStep::new(name, accepts, produces, handler))
}

pub fn ready(platform: &str, value: i64) -> Ev {
    Ev::Ready {
        platform: platform.to_string(),
        value,
    }
}

/// Combine `Ready` events into one `Collected`, keeping arrival order.
pub fn collect(events: Vec<Ev>) -> Ev {
    Ev::Collected(
        events
            .into_iter()
            .filter_map(|e| match e {
                Ev::Ready { platform, value } => Some((platform, value)),
                _ => None,
            })
            .collect(),
    )
}

pub fn collect_join(required: usize) -> JoinDef<Ev> {
    JoinDef::new("collect", [Tag::Ready], required, Tag::Collected, collect)
}

/// Branch step that sleeps (cancellably) for the delay carried by its event,
/// then reports one value.
pub fn branch(name: &str, tag: Tag, platform: &'static str, value: i64) -> Arc<dyn Step<Ev>> {
    step(name, [tag], [Tag::Ready], move |ctx, ev| {
        async move {
            let delay = match ev {
                Ev::A(ms) | Ev::B(ms) => ms,
                _ => 0,
            };
            ctx.emit_progress(format!("{} looking up", platform));
            ctx.cancellable(tokio::time::sleep(Duration::from_millis(delay)))
                .await?;
            Ok(StepOutput::emit(ready(platform, value)))
        }
        .boxed()
    })
}

/// Collector step: turns the combined event into the terminal payload.
pub fn finish() -> Arc<dyn Step<Ev>> {
    step("finish", [Tag::Collected], [Tag::Stop], |_ctx, ev| {
        async move {
            match ev {
                Ev::Collected(items) => Ok(StepOutput::emit(Ev::Stop(serde_json::json!(items)))),
                other => Err(StepError::ExecutionFailed(format!("unexpected {:?}", other))),
            }
        }
        .boxed()
    })
}

/// start -> fan -> {A, B} -> branches -> join(2) -> finish -> Stop
pub fn fan_out_workflow(delay_a: u64, delay_b: u64) -> Workflow<Ev> {
    let mut registry = StepRegistry::new("fan-out", Tag::Start, Tag::Stop);
    registry
        .register(step("fan", [Tag::Start], [Tag::A, Tag::B], move |_ctx, _ev| {
            async move { Ok(StepOutput::fan_out([Ev::A(delay_a), Ev::B(delay_b)])) }.boxed()
        }))
        .unwrap();
    registry.register(branch("branch-a", Tag::A, "a", 1)).unwrap();
    registry.register(branch("branch-b", Tag::B, "b", 2)).unwrap();
    registry.join(collect_join(2)).unwrap();
    registry.register(finish()).unwrap();
    registry.build().unwrap()
}

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}
