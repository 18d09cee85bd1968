use flowcore::Event;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Social platform a draft is prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    Linkedin,
    Mastodon,
    Bluesky,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Twitter,
        Platform::Linkedin,
        Platform::Mastodon,
        Platform::Bluesky,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Linkedin => "linkedin",
            Platform::Mastodon => "mastodon",
            Platform::Bluesky => "bluesky",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Twitter => "Twitter",
            Platform::Linkedin => "LinkedIn",
            Platform::Mastodon => "Mastodon",
            Platform::Bluesky => "Bluesky",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "twitter" | "x" => Ok(Platform::Twitter),
            "linkedin" => Ok(Platform::Linkedin),
            "mastodon" => Ok(Platform::Mastodon),
            "bluesky" | "bsky" => Ok(Platform::Bluesky),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// Handles found on one platform, keyed by entity placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformHandles {
    pub platform: Platform,
    pub handles: BTreeMap<String, String>,
    /// Entities whose search answer could not be turned into a handle.
    pub unresolved: Vec<String>,
}

/// Events of the cross-poster workflow.
#[derive(Debug, Clone, PartialEq)]
pub enum PosterEvent {
    Start {
        text: String,
    },
    Mentions {
        source_draft: String,
    },
    Lookup {
        platform: Platform,
        entities: BTreeMap<String, String>,
    },
    HandlesReady(PlatformHandles),
    Collected(Vec<PlatformHandles>),
    Stop {
        drafts: BTreeMap<Platform, String>,
    },
}

impl PosterEvent {
    pub fn start(text: impl Into<String>) -> Self {
        PosterEvent::Start { text: text.into() }
    }

    /// Per-platform drafts carried by the terminal event.
    pub fn into_drafts(self) -> Option<BTreeMap<Platform, String>> {
        match self {
            PosterEvent::Stop { drafts } => Some(drafts),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PosterTag {
    Start,
    Mentions,
    Lookup(Platform),
    HandlesReady,
    Collected,
    Stop,
}

impl Event for PosterEvent {
    type Tag = PosterTag;

    fn tag(&self) -> PosterTag {
        match self {
            PosterEvent::Start { .. } => PosterTag::Start,
            PosterEvent::Mentions { .. } => PosterTag::Mentions,
            PosterEvent::Lookup { platform, .. } => PosterTag::Lookup(*platform),
            PosterEvent::HandlesReady(_) => PosterTag::HandlesReady,
            PosterEvent::Collected(_) => PosterTag::Collected,
            PosterEvent::Stop { .. } => PosterTag::Stop,
        }
    }
}
