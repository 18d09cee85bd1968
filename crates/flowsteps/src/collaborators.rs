use crate::Platform;
use async_trait::async_trait;
use flowcore::StepError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A draft rewritten with `@[key]` placeholders plus the entity behind each key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub text: String,
    #[serde(default)]
    pub entities: BTreeMap<String, String>,
}

impl Extraction {
    /// Parse a model answer. Prose around the JSON object is ignored.
    pub fn from_json(answer: &str) -> Result<Self, StepError> {
        let body = match (answer.find('{'), answer.rfind('}')) {
            (Some(start), Some(end)) if start < end => &answer[start..=end],
            _ => {
                return Err(StepError::ExecutionFailed(format!(
                    "extraction answer contains no JSON object: {:?}",
                    answer
                )))
            }
        };
        serde_json::from_str(body)
            .map_err(|e| StepError::ExecutionFailed(format!("invalid extraction answer: {}", e)))
    }

    /// Entity keys whose placeholder does not occur in the text.
    pub fn missing_placeholders(&self) -> Vec<String> {
        self.entities
            .keys()
            .filter(|key| !self.text.contains(&format!("@[{}]", key)))
            .cloned()
            .collect()
    }
}

/// Finds the entities worth @-mentioning in a draft.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract(&self, draft: &str) -> Result<Extraction, StepError>;
}

/// Looks up an entity's account on a platform.
///
/// Returns the raw answer (usually a profile URL); turning it into a handle is
/// up to the caller. Transport failures are errors, "not found" is an answer.
#[async_trait]
pub trait ProfileSearch: Send + Sync {
    async fn find_profile(&self, platform: Platform, entity: &str) -> Result<String, StepError>;
}
