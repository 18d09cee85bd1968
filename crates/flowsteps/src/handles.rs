use crate::Platform;
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandleError {
    #[error("No URL in search answer: {0:?}")]
    NoUrl(String),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("'{url}' is not a {platform} address")]
    WrongHost { platform: Platform, url: String },

    #[error("'{url}' does not point at a {platform} account")]
    NotAProfile { platform: Platform, url: String },

    #[error("Invalid {platform} account name '{name}'")]
    InvalidName { platform: Platform, name: String },
}

const TWITTER_HOSTS: [&str; 6] = [
    "twitter.com",
    "www.twitter.com",
    "mobile.twitter.com",
    "x.com",
    "www.x.com",
    "mobile.x.com",
];

const TWITTER_RESERVED: [&str; 10] = [
    "home", "search", "i", "intent", "share", "explore", "hashtag", "settings", "login", "messages",
];

/// Turn a free-form search answer into the mention syntax used in drafts.
///
/// | platform | accepted answer | result |
/// |---|---|---|
/// | Twitter | `https://twitter.com/<user>`, `https://x.com/<user>`, `@user` | `@user` |
/// | LinkedIn | `https://www.linkedin.com/in/<slug>` or `/company/<slug>` | `linkedin.com/in/<slug>` |
/// | Mastodon | `https://<host>/@<user>`, `@user@host` | `@user@host` |
/// | Bluesky | `https://bsky.app/profile/<handle>`, `@handle` | `@handle` |
pub fn parse_handle(platform: Platform, answer: &str) -> Result<String, HandleError> {
    let answer = answer.trim();

    if let Some(handle) = bare_handle(platform, answer) {
        return Ok(handle);
    }

    let raw = find_url(answer).ok_or_else(|| HandleError::NoUrl(answer.to_string()))?;
    let url = Url::parse(raw).map_err(|e| HandleError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    let host = url.host_str().unwrap_or_default().to_string();
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let not_a_profile = || HandleError::NotAProfile {
        platform,
        url: raw.to_string(),
    };
    let wrong_host = || HandleError::WrongHost {
        platform,
        url: raw.to_string(),
    };

    match platform {
        Platform::Twitter => {
            if !TWITTER_HOSTS.contains(&host.as_str()) {
                return Err(wrong_host());
            }
            let user = segments.first().ok_or_else(not_a_profile)?;
            if TWITTER_RESERVED.contains(&user.to_ascii_lowercase().as_str()) {
                return Err(not_a_profile());
            }
            check_twitter_name(user)?;
            Ok(format!("@{}", user))
        }
        Platform::Linkedin => {
            if host != "linkedin.com" && !host.ends_with(".linkedin.com") {
                return Err(wrong_host());
            }
            match segments.as_slice() {
                [kind @ ("in" | "company"), slug, ..] if is_slug(slug) => {
                    Ok(format!("linkedin.com/{}/{}", kind, slug))
                }
                _ => Err(not_a_profile()),
            }
        }
        Platform::Mastodon => {
            if host.is_empty() {
                return Err(wrong_host());
            }
            let user = segments
                .first()
                .and_then(|seg| seg.strip_prefix('@'))
                .ok_or_else(not_a_profile)?;
            if user.is_empty() || !user.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(HandleError::InvalidName {
                    platform,
                    name: user.to_string(),
                });
            }
            Ok(format!("@{}@{}", user, host))
        }
        Platform::Bluesky => {
            if host != "bsky.app" {
                return Err(wrong_host());
            }
            match segments.as_slice() {
                ["profile", handle, ..] => {
                    check_bluesky_name(handle)?;
                    Ok(format!("@{}", handle))
                }
                _ => Err(not_a_profile()),
            }
        }
    }
}

/// Answers that already are a mention, e.g. `@jack`.
fn bare_handle(platform: Platform, answer: &str) -> Option<String> {
    let name = answer.strip_prefix('@')?;
    if name.chars().any(char::is_whitespace) {
        return None;
    }
    let valid = match platform {
        Platform::Twitter => check_twitter_name(name).is_ok(),
        Platform::Mastodon => match name.split_once('@') {
            Some((user, host)) => {
                !user.is_empty()
                    && user.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                    && host.contains('.')
            }
            None => false,
        },
        Platform::Bluesky => check_bluesky_name(name).is_ok(),
        Platform::Linkedin => false,
    };
    valid.then(|| answer.to_string())
}

/// First `http(s)://` token, stripped of surrounding punctuation.
fn find_url(answer: &str) -> Option<&str> {
    answer
        .split_whitespace()
        .map(|token| {
            token.trim_matches(|c: char| matches!(c, '<' | '>' | '(' | ')' | '[' | ']' | '"' | '\'' | ',' | ';'))
        })
        .map(|token| token.trim_end_matches('.'))
        .find(|token| token.starts_with("https://") || token.starts_with("http://"))
}

fn check_twitter_name(name: &str) -> Result<(), HandleError> {
    let valid = (1..=15).contains(&name.len())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(HandleError::InvalidName {
            platform: Platform::Twitter,
            name: name.to_string(),
        })
    }
}

fn check_bluesky_name(name: &str) -> Result<(), HandleError> {
    let valid = name.contains('.')
        && !name.starts_with('.')
        && !name.ends_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(HandleError::InvalidName {
            platform: Platform::Bluesky,
            name: name.to_string(),
        })
    }
}

fn is_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '%')
}

/// Replace each `@[key]` placeholder with its handle, or with the entity's
/// plain name when no handle was found.
pub fn splice_handles(
    draft: &str,
    handles: &BTreeMap<String, String>,
    entities: &BTreeMap<String, String>,
) -> String {
    let mut spliced = draft.to_string();
    for (key, name) in entities {
        let replacement = handles.get(key).unwrap_or(name);
        spliced = spliced.replace(&format!("@[{}]", key), replacement);
    }
    spliced
}
