use crate::{EntityExtractor, Extraction, Platform, ProfileSearch};
use async_trait::async_trait;
use flowcore::StepError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// A recorded extractor answer: either already structured, or the model's
/// raw text, which is parsed on replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordedExtraction {
    Structured(Extraction),
    Raw(String),
}

/// Canned collaborator answers, replayed in place of live model and search
/// calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayFixture {
    /// Draft to run when the caller supplies none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<String>,
    pub extraction: RecordedExtraction,
    /// Search answers per platform, keyed by entity name.
    #[serde(default)]
    pub profiles: BTreeMap<Platform, BTreeMap<String, String>>,
    /// Delay added to every replayed call.
    #[serde(default)]
    pub latency_ms: u64,
}

impl ReplayFixture {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Fixture written by `flow init`.
    pub fn example() -> Self {
        let entities = BTreeMap::from([
            ("entity1".to_string(), "LlamaIndex".to_string()),
            ("entity2".to_string(), "Anthropic".to_string()),
        ]);

        let profiles = BTreeMap::from([
            (
                Platform::Twitter,
                BTreeMap::from([
                    ("LlamaIndex".to_string(), "https://twitter.com/llama_index".to_string()),
                    ("Anthropic".to_string(), "https://x.com/AnthropicAI".to_string()),
                ]),
            ),
            (
                Platform::Linkedin,
                BTreeMap::from([
                    (
                        "LlamaIndex".to_string(),
                        "https://www.linkedin.com/company/llamaindex/".to_string(),
                    ),
                    (
                        "Anthropic".to_string(),
                        "https://www.linkedin.com/company/anthropicresearch".to_string(),
                    ),
                ]),
            ),
            (
                Platform::Mastodon,
                BTreeMap::from([(
                    "LlamaIndex".to_string(),
                    "https://mastodon.social/@llamaindex".to_string(),
                )]),
            ),
            (
                Platform::Bluesky,
                BTreeMap::from([
                    (
                        "LlamaIndex".to_string(),
                        "https://bsky.app/profile/llamaindex.bsky.social".to_string(),
                    ),
                    (
                        "Anthropic".to_string(),
                        "https://bsky.app/profile/anthropic.com".to_string(),
                    ),
                ]),
            ),
        ]);

        Self {
            draft: Some("Building a cross-poster with LlamaIndex workflows and Anthropic models.".to_string()),
            extraction: RecordedExtraction::Structured(Extraction {
                text: "Building a cross-poster with @[entity1] workflows and @[entity2] models.".to_string(),
                entities,
            }),
            profiles,
            latency_ms: 0,
        }
    }

    async fn delay(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;
        }
    }
}

#[async_trait]
impl EntityExtractor for ReplayFixture {
    async fn extract(&self, draft: &str) -> Result<Extraction, StepError> {
        self.delay().await;
        debug!(chars = draft.len(), "Replaying recorded extraction");
        match &self.extraction {
            RecordedExtraction::Structured(extraction) => Ok(extraction.clone()),
            RecordedExtraction::Raw(answer) => Extraction::from_json(answer),
        }
    }
}

#[async_trait]
impl ProfileSearch for ReplayFixture {
    async fn find_profile(&self, platform: Platform, entity: &str) -> Result<String, StepError> {
        self.delay().await;
        let answer = self
            .profiles
            .get(&platform)
            .and_then(|answers| answers.get(entity))
            .cloned()
            .unwrap_or_else(|| format!("No {} profile found for {}", platform, entity));
        Ok(answer)
    }
}
