use crate::{PosterEvent, PosterTag, SOURCE_DRAFT};
use async_trait::async_trait;
use flowcore::{tag_name, Context, Event, Step, StepError, StepOutput};

/// Stores the incoming draft and hands it to mention extraction.
pub struct InitializeStep;

#[async_trait]
impl Step<PosterEvent> for InitializeStep {
    fn name(&self) -> &str {
        "initialize"
    }

    fn accepts(&self) -> Vec<PosterTag> {
        vec![PosterTag::Start]
    }

    fn produces(&self) -> Vec<PosterTag> {
        vec![PosterTag::Mentions]
    }

    async fn run(
        &self,
        ctx: Context<PosterEvent>,
        event: PosterEvent,
    ) -> Result<StepOutput<PosterEvent>, StepError> {
        let text = match event {
            PosterEvent::Start { text } => text,
            other => {
                return Err(StepError::UnexpectedEvent {
                    step: self.name().to_string(),
                    tag: tag_name(&other.tag()),
                })
            }
        };

        ctx.emit_progress("Received source draft...");
        ctx.set(SOURCE_DRAFT, &text).await?;

        Ok(StepOutput::emit(PosterEvent::Mentions { source_draft: text }))
    }
}
