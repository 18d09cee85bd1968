use crate::{EntityExtractor, Platform, PosterEvent, PosterTag, ENTITIES, PLACEHOLDER_DRAFT};
use async_trait::async_trait;
use flowcore::{tag_name, Context, Event, Step, StepError, StepOutput};
use std::sync::Arc;
use tracing::{debug, warn};

/// Asks the extractor for @-mention candidates, then fans out one lookup per
/// enabled platform.
pub struct ExtractMentionsStep {
    extractor: Arc<dyn EntityExtractor>,
    platforms: Vec<Platform>,
}

impl ExtractMentionsStep {
    pub fn new(extractor: Arc<dyn EntityExtractor>, platforms: Vec<Platform>) -> Self {
        Self {
            extractor,
            platforms,
        }
    }
}

#[async_trait]
impl Step<PosterEvent> for ExtractMentionsStep {
    fn name(&self) -> &str {
        "extract-mentions"
    }

    fn accepts(&self) -> Vec<PosterTag> {
        vec![PosterTag::Mentions]
    }

    fn produces(&self) -> Vec<PosterTag> {
        self.platforms.iter().map(|p| PosterTag::Lookup(*p)).collect()
    }

    async fn run(
        &self,
        ctx: Context<PosterEvent>,
        event: PosterEvent,
    ) -> Result<StepOutput<PosterEvent>, StepError> {
        let source_draft = match event {
            PosterEvent::Mentions { source_draft } => source_draft,
            other => {
                return Err(StepError::UnexpectedEvent {
                    step: self.name().to_string(),
                    tag: tag_name(&other.tag()),
                })
            }
        };

        ctx.emit_progress("Extracting entities...");
        let extraction = ctx
            .cancellable(self.extractor.extract(&source_draft))
            .await??;

        let missing = extraction.missing_placeholders();
        if !missing.is_empty() {
            warn!(run_id = %ctx.run_id(), missing = ?missing, "Extracted entities without a placeholder in the text");
        }

        ctx.set(PLACEHOLDER_DRAFT, &extraction.text).await?;
        ctx.set(ENTITIES, &extraction.entities).await?;

        let listed = serde_json::to_string(&extraction.entities)
            .map_err(|e| StepError::ExecutionFailed(e.to_string()))?;
        ctx.emit_progress(format!("Extracted entities: {}", listed));
        ctx.emit_progress(format!("Entity placeholder draft: {}", extraction.text));

        for platform in &self.platforms {
            debug!(run_id = %ctx.run_id(), platform = platform.id(), "Requesting handle lookup");
            ctx.send_event(PosterEvent::Lookup {
                platform: *platform,
                entities: extraction.entities.clone(),
            })?;
        }

        Ok(StepOutput::none())
    }
}
