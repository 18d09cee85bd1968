use crate::handles::splice_handles;
use crate::{PlatformHandles, PosterEvent, PosterTag, ENTITIES, PLACEHOLDER_DRAFT};
use async_trait::async_trait;
use flowcore::{tag_name, Context, Event, Step, StepError, StepOutput};
use flowruntime::JoinDef;
use std::collections::BTreeMap;

pub const HANDLES_JOIN: &str = "platform-handles";

/// Fan-in of every platform's handles into one `Collected` event.
pub fn handles_join(platforms: usize) -> JoinDef<PosterEvent> {
    JoinDef::new(
        HANDLES_JOIN,
        [PosterTag::HandlesReady],
        platforms,
        PosterTag::Collected,
        |events| {
            PosterEvent::Collected(
                events
                    .into_iter()
                    .filter_map(|event| match event {
                        PosterEvent::HandlesReady(handles) => Some(handles),
                        _ => None,
                    })
                    .collect(),
            )
        },
    )
}

/// Splices the collected handles into one draft per platform.
pub struct CollectHandlesStep;

#[async_trait]
impl Step<PosterEvent> for CollectHandlesStep {
    fn name(&self) -> &str {
        "collect-handles"
    }

    fn accepts(&self) -> Vec<PosterTag> {
        vec![PosterTag::Collected]
    }

    fn produces(&self) -> Vec<PosterTag> {
        vec![PosterTag::Stop]
    }

    async fn run(
        &self,
        ctx: Context<PosterEvent>,
        event: PosterEvent,
    ) -> Result<StepOutput<PosterEvent>, StepError> {
        let collected: Vec<PlatformHandles> = match event {
            PosterEvent::Collected(collected) => collected,
            other => {
                return Err(StepError::UnexpectedEvent {
                    step: self.name().to_string(),
                    tag: tag_name(&other.tag()),
                })
            }
        };

        ctx.emit_progress("Collecting generated handles...");
        let draft: String = ctx.get_as(PLACEHOLDER_DRAFT).await?;
        let entities: BTreeMap<String, String> = ctx.get_as(ENTITIES).await?;

        let mut drafts = BTreeMap::new();
        for result in collected {
            ctx.emit_progress(format!(
                "Collected {} handles: {:?}",
                result.platform, result.handles
            ));
            drafts.insert(
                result.platform,
                splice_handles(&draft, &result.handles, &entities),
            );
        }

        Ok(StepOutput::emit(PosterEvent::Stop { drafts }))
    }
}
