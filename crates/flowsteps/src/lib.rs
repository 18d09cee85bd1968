//! Cross-poster step graph
//!
//! Turns one source draft into a draft per social platform with the right
//! @-mentions. Entity extraction and profile search are collaborators behind
//! traits; `ReplayFixture` replays recorded answers for both.

mod collaborators;
mod collect;
mod event;
mod fixture;
mod handles;
mod initialize;
mod lookup;
mod mentions;

pub use collaborators::{EntityExtractor, Extraction, ProfileSearch};
pub use collect::{handles_join, CollectHandlesStep, HANDLES_JOIN};
pub use event::{Platform, PlatformHandles, PosterEvent, PosterTag};
pub use fixture::{RecordedExtraction, ReplayFixture};
pub use handles::{parse_handle, splice_handles, HandleError};
pub use initialize::InitializeStep;
pub use lookup::LookupStep;
pub use mentions::ExtractMentionsStep;

use flowcore::DefinitionError;
use flowruntime::{StepRegistry, Workflow};
use std::sync::Arc;

pub const WORKFLOW_NAME: &str = "crossposter";

/// Context keys shared between steps.
pub const SOURCE_DRAFT: &str = "source_draft";
pub const PLACEHOLDER_DRAFT: &str = "entity_placeholder_draft";
pub const ENTITIES: &str = "entities";

/// Build the cross-poster graph for the given platforms (duplicates ignored,
/// order kept).
pub fn crossposter_workflow(
    extractor: Arc<dyn EntityExtractor>,
    search: Arc<dyn ProfileSearch>,
    platforms: &[Platform],
) -> Result<Workflow<PosterEvent>, DefinitionError> {
    let mut enabled: Vec<Platform> = Vec::with_capacity(platforms.len());
    for platform in platforms {
        if !enabled.contains(platform) {
            enabled.push(*platform);
        }
    }

    let mut registry = StepRegistry::new(WORKFLOW_NAME, PosterTag::Start, PosterTag::Stop);
    registry.register(Arc::new(InitializeStep))?;
    registry.register(Arc::new(ExtractMentionsStep::new(extractor, enabled.clone())))?;
    for platform in &enabled {
        registry.register(Arc::new(LookupStep::new(*platform, search.clone())))?;
    }
    registry.join(handles_join(enabled.len()))?;
    registry.register(Arc::new(CollectHandlesStep))?;
    registry.build()
}
