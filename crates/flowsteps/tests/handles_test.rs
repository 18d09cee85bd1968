// crates/flowsteps/tests/handles_test.rs

use flowcore::StepError;
use flowsteps::{parse_handle, splice_handles, Extraction, HandleError, Platform};
use std::collections::BTreeMap;

#[test]
fn test_twitter_answers_become_at_handles() {
    let cases = [
        ("https://twitter.com/llama_index", "@llama_index"),
        ("Here it is: https://x.com/AnthropicAI.", "@AnthropicAI"),
        ("https://mobile.twitter.com/jack?lang=en", "@jack"),
        ("<https://www.x.com/jack/>", "@jack"),
        ("@jack", "@jack"),
    ];
    for (answer, expected) in cases {
        assert_eq!(parse_handle(Platform::Twitter, answer).unwrap(), expected, "{}", answer);
    }
}

#[test]
fn test_twitter_rejects_non_profiles() {
    assert!(matches!(
        parse_handle(Platform::Twitter, "https://twitter.com/search?q=llama"),
        Err(HandleError::NotAProfile { .. })
    ));
    assert!(matches!(
        parse_handle(Platform::Twitter, "https://facebook.com/jack"),
        Err(HandleError::WrongHost { .. })
    ));
    assert!(matches!(
        parse_handle(Platform::Twitter, "https://twitter.com/this_name_is_far_too_long"),
        Err(HandleError::InvalidName { .. })
    ));
    assert!(matches!(
        parse_handle(Platform::Twitter, "https://twitter.com/"),
        Err(HandleError::NotAProfile { .. })
    ));
}

#[test]
fn test_linkedin_keeps_profile_kind() {
    assert_eq!(
        parse_handle(Platform::Linkedin, "https://www.linkedin.com/in/jane-doe/").unwrap(),
        "linkedin.com/in/jane-doe"
    );
    assert_eq!(
        parse_handle(Platform::Linkedin, "https://linkedin.com/company/llamaindex").unwrap(),
        "linkedin.com/company/llamaindex"
    );
    assert!(matches!(
        parse_handle(Platform::Linkedin, "https://www.linkedin.com/feed/"),
        Err(HandleError::NotAProfile { .. })
    ));
    assert!(matches!(
        parse_handle(Platform::Linkedin, "https://notlinkedin.com/in/jane"),
        Err(HandleError::WrongHost { .. })
    ));
}

#[test]
fn test_mastodon_handle_includes_instance() {
    assert_eq!(
        parse_handle(Platform::Mastodon, "https://mastodon.social/@Gargron").unwrap(),
        "@Gargron@mastodon.social"
    );
    assert_eq!(
        parse_handle(Platform::Mastodon, "@Gargron@mastodon.social").unwrap(),
        "@Gargron@mastodon.social"
    );
    assert!(matches!(
        parse_handle(Platform::Mastodon, "https://mastodon.social/about"),
        Err(HandleError::NotAProfile { .. })
    ));
}

#[test]
fn test_bluesky_profile_path() {
    assert_eq!(
        parse_handle(Platform::Bluesky, "https://bsky.app/profile/jay.bsky.team").unwrap(),
        "@jay.bsky.team"
    );
    assert_eq!(
        parse_handle(Platform::Bluesky, "@anthropic.com").unwrap(),
        "@anthropic.com"
    );
    assert!(matches!(
        parse_handle(Platform::Bluesky, "https://bsky.app/search?q=jay"),
        Err(HandleError::NotAProfile { .. })
    ));
    assert!(matches!(
        parse_handle(Platform::Bluesky, "https://bsky.app/profile/nodot"),
        Err(HandleError::InvalidName { .. })
    ));
}

#[test]
fn test_answer_without_url_is_rejected() {
    let err = parse_handle(Platform::Twitter, "I could not find an account for them.").unwrap_err();
    assert!(matches!(err, HandleError::NoUrl(_)));
}

#[test]
fn test_splice_falls_back_to_plain_name() {
    let entities = BTreeMap::from([
        ("entity1".to_string(), "LlamaIndex".to_string()),
        ("entity2".to_string(), "Anthropic".to_string()),
    ]);
    let handles = BTreeMap::from([("entity1".to_string(), "@llama_index".to_string())]);

    let draft = splice_handles("Thanks @[entity1] and @[entity2]! cc @[entity1]", &handles, &entities);
    assert_eq!(draft, "Thanks @llama_index and Anthropic! cc @llama_index");
}

#[test]
fn test_extraction_parses_json_inside_prose() {
    let answer = r#"Sure, here you go:
        {"text": "Hello @[entity1]", "entities": {"entity1": "Rust Foundation", "entity2": "Ferris"}}
        Let me know if you need more."#;

    let extraction = Extraction::from_json(answer).unwrap();
    assert_eq!(extraction.text, "Hello @[entity1]");
    assert_eq!(extraction.entities.len(), 2);
    assert_eq!(extraction.missing_placeholders(), vec!["entity2".to_string()]);
}

#[test]
fn test_extraction_rejects_non_json() {
    let err = Extraction::from_json("no entities here").unwrap_err();
    assert!(matches!(err, StepError::ExecutionFailed(_)));

    let err = Extraction::from_json("{\"entities\": {}}").unwrap_err();
    assert!(matches!(err, StepError::ExecutionFailed(msg) if msg.contains("text")));
}

#[test]
fn test_platform_names_parse() {
    assert_eq!("Twitter".parse::<Platform>().unwrap(), Platform::Twitter);
    assert_eq!("x".parse::<Platform>().unwrap(), Platform::Twitter);
    assert_eq!("bsky".parse::<Platform>().unwrap(), Platform::Bluesky);
    assert!("myspace".parse::<Platform>().is_err());
    assert_eq!(Platform::Linkedin.to_string(), "LinkedIn");
}
