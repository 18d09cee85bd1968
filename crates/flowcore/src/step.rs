use crate::{Context, Event, StepError, StepOutput};
use async_trait::async_trait;
use futures_util::future::BoxFuture;

/// A unit of work in a workflow graph.
///
/// The accepted and produced tags are read once, when the step is
/// registered; the registry uses them to validate the graph and route events.
#[async_trait]
pub trait Step<E: Event>: Send + Sync {
    /// Unique name within the workflow (e.g. "extract-mentions").
    fn name(&self) -> &str;

    /// Tags this step consumes.
    fn accepts(&self) -> Vec<E::Tag>;

    /// Tags this step may emit, either returned or sent mid-run.
    fn produces(&self) -> Vec<E::Tag>;

    /// Handle one event.
    async fn run(&self, ctx: Context<E>, event: E) -> Result<StepOutput<E>, StepError>;
}

type Handler<E> =
    Box<dyn Fn(Context<E>, E) -> BoxFuture<'static, Result<StepOutput<E>, StepError>> + Send + Sync>;

/// A step built from a closure.
///
/// ```ignore
/// let step = FnStep::new("double", [Tag::In], [Tag::Out], |_ctx, ev| {
///     async move { Ok(StepOutput::emit(double(ev))) }.boxed()
/// });
/// ```
pub struct FnStep<E: Event> {
    name: String,
    accepts: Vec<E::Tag>,
    produces: Vec<E::Tag>,
    handler: Handler<E>,
}

impl<E: Event> FnStep<E> {
    pub fn new<F>(
        name: impl Into<String>,
        accepts: impl IntoIterator<Item = E::Tag>,
        produces: impl IntoIterator<Item = E::Tag>,
        handler: F,
    ) -> Self
    where
        F: Fn(Context<E>, E) -> BoxFuture<'static, Result<StepOutput<E>, StepError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            accepts: accepts.into_iter().collect(),
            produces: produces.into_iter().collect(),
            handler: Box::new(handler),
        }
    }
}

#[async_trait]
impl<E: Event> Step<E> for FnStep<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self) -> Vec<E::Tag> {
        self.accepts.clone()
    }

    fn produces(&self) -> Vec<E::Tag> {
        self.produces.clone()
    }

    async fn run(&self, ctx: Context<E>, event: E) -> Result<StepOutput<E>, StepError> {
        (self.handler)(ctx, event).await
    }
}
