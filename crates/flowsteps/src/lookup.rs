use crate::handles::parse_handle;
use crate::{Platform, PlatformHandles, PosterEvent, PosterTag, ProfileSearch};
use async_trait::async_trait;
use flowcore::{tag_name, Context, Event, Step, StepError, StepOutput};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Resolves every entity to a handle on one platform.
///
/// Entities are looked up one after another. An answer that cannot be parsed
/// leaves the entity unresolved; a failing search fails the step.
pub struct LookupStep {
    name: String,
    platform: Platform,
    search: Arc<dyn ProfileSearch>,
}

impl LookupStep {
    pub fn new(platform: Platform, search: Arc<dyn ProfileSearch>) -> Self {
        Self {
            name: format!("lookup-{}", platform.id()),
            platform,
            search,
        }
    }
}

#[async_trait]
impl Step<PosterEvent> for LookupStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self) -> Vec<PosterTag> {
        vec![PosterTag::Lookup(self.platform)]
    }

    fn produces(&self) -> Vec<PosterTag> {
        vec![PosterTag::HandlesReady]
    }

    async fn run(
        &self,
        ctx: Context<PosterEvent>,
        event: PosterEvent,
    ) -> Result<StepOutput<PosterEvent>, StepError> {
        let entities = match event {
            PosterEvent::Lookup { platform, entities } if platform == self.platform => entities,
            other => {
                return Err(StepError::UnexpectedEvent {
                    step: self.name.clone(),
                    tag: tag_name(&other.tag()),
                })
            }
        };

        let platform = self.platform;
        ctx.emit_progress(format!("Generating {} handles...", platform));

        let mut handles = BTreeMap::new();
        let mut unresolved = Vec::new();
        for (key, entity) in &entities {
            ctx.checkpoint()?;
            ctx.emit_progress(format!("Looking up {} handle for {}...", platform, entity));

            let answer = ctx
                .cancellable(self.search.find_profile(platform, entity))
                .await??;

            match parse_handle(platform, &answer) {
                Ok(handle) => {
                    ctx.emit_progress(format!("Found {} handle for {}: {}", platform, entity, handle));
                    handles.insert(key.clone(), handle);
                }
                Err(e) => {
                    warn!(
                        run_id = %ctx.run_id(),
                        step = %self.name,
                        entity = %entity,
                        error = %e,
                        "Unparseable search answer"
                    );
                    ctx.emit_progress(format!(
                        "No {} handle for {}, keeping the plain name ({})",
                        platform, entity, e
                    ));
                    unresolved.push(key.clone());
                }
            }
        }

        Ok(StepOutput::emit(PosterEvent::HandlesReady(PlatformHandles {
            platform,
            handles,
            unresolved,
        })))
    }
}
