// crates/flowsteps/tests/crossposter_test.rs

use async_trait::async_trait;
use flowcore::{DefinitionError, FlowError, ProgressEvent, StepError};
use flowruntime::{FlowRuntime, RuntimeConfig};
use flowsteps::{
    crossposter_workflow, Platform, PosterEvent, ProfileSearch, RecordedExtraction, ReplayFixture,
    HANDLES_JOIN,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

fn fixture_runtime(fixture: ReplayFixture, platforms: &[Platform]) -> FlowRuntime<PosterEvent> {
    let fixture = Arc::new(fixture);
    let workflow = crossposter_workflow(fixture.clone(), fixture, platforms).unwrap();
    FlowRuntime::new(workflow)
}

fn source_draft() -> PosterEvent {
    PosterEvent::start("Building a cross-poster with LlamaIndex workflows and Anthropic models.")
}

struct FailingSearch;

#[async_trait]
impl ProfileSearch for FailingSearch {
    async fn find_profile(&self, _platform: Platform, _entity: &str) -> Result<String, StepError> {
        Err(StepError::ExecutionFailed("search quota exceeded".to_string()))
    }
}

#[tokio::test]
async fn test_full_run_produces_a_draft_per_platform() {
    init_tracing();

    let runtime = fixture_runtime(ReplayFixture::example(), &Platform::ALL);
    let mut handle = runtime.start(source_draft()).unwrap();
    let progress = handle.progress().unwrap();

    let events: Vec<ProgressEvent> = progress.into_stream().collect().await;
    let drafts = handle.result().await.unwrap().into_drafts().unwrap();

    assert_eq!(drafts.len(), 4);
    assert_eq!(
        drafts[&Platform::Twitter],
        "Building a cross-poster with @llama_index workflows and @AnthropicAI models."
    );
    assert_eq!(
        drafts[&Platform::Linkedin],
        "Building a cross-poster with linkedin.com/company/llamaindex workflows and linkedin.com/company/anthropicresearch models."
    );
    assert_eq!(
        drafts[&Platform::Mastodon],
        "Building a cross-poster with @llamaindex@mastodon.social workflows and Anthropic models."
    );
    assert_eq!(
        drafts[&Platform::Bluesky],
        "Building a cross-poster with @llamaindex.bsky.social workflows and @anthropic.com models."
    );

    let messages: Vec<&str> = events.iter().filter_map(|e| e.message()).collect();
    for expected in [
        "Received source draft...",
        "Extracting entities...",
        "Generating Twitter handles...",
        "Looking up Bluesky handle for Anthropic...",
        "Collecting generated handles...",
    ] {
        assert!(messages.contains(&expected), "missing progress message {:?}", expected);
    }
    assert!(messages
        .iter()
        .any(|m| m.starts_with("No Mastodon handle for Anthropic")));
    assert!(events.last().unwrap().is_final());
}

#[tokio::test]
async fn test_raw_model_answer_is_parsed() {
    let mut fixture = ReplayFixture::example();
    fixture.extraction = RecordedExtraction::Raw(
        r#"Here is the JSON: {"text": "Shipped with @[entity1]", "entities": {"entity1": "LlamaIndex"}}"#
            .to_string(),
    );

    let runtime = fixture_runtime(fixture, &[Platform::Twitter]);
    let drafts = runtime
        .run(PosterEvent::start("Shipped with LlamaIndex"))
        .await
        .unwrap()
        .into_drafts()
        .unwrap();

    assert_eq!(drafts[&Platform::Twitter], "Shipped with @llama_index");
}

#[tokio::test]
async fn test_platform_subset_ignores_duplicates() {
    let fixture = Arc::new(ReplayFixture::example());
    let workflow = crossposter_workflow(
        fixture.clone(),
        fixture,
        &[Platform::Twitter, Platform::Twitter, Platform::Bluesky],
    )
    .unwrap();

    let names: Vec<String> = workflow.steps().into_iter().map(|s| s.name).collect();
    assert_eq!(
        names,
        vec![
            "initialize",
            "extract-mentions",
            "lookup-twitter",
            "lookup-bluesky",
            "collect-handles"
        ]
    );
    let joins = workflow.joins();
    assert_eq!(joins[0].name, HANDLES_JOIN);
    assert_eq!(joins[0].required, 2);

    let drafts = FlowRuntime::new(workflow)
        .run(source_draft())
        .await
        .unwrap()
        .into_drafts()
        .unwrap();
    let platforms: Vec<Platform> = drafts.keys().copied().collect();
    assert_eq!(platforms, vec![Platform::Twitter, Platform::Bluesky]);
}

#[tokio::test]
async fn test_search_failure_fails_the_run() {
    let fixture = Arc::new(ReplayFixture::example());
    let workflow =
        crossposter_workflow(fixture, Arc::new(FailingSearch), &[Platform::Twitter, Platform::Linkedin])
            .unwrap();

    let err = FlowRuntime::new(workflow).run(source_draft()).await.unwrap_err();
    match err {
        FlowError::StepFailed { step, source } => {
            assert!(step.starts_with("lookup-"));
            assert_eq!(
                source,
                StepError::ExecutionFailed("search quota exceeded".to_string())
            );
        }
        other => panic!("expected a failed lookup, got {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_search_times_out() {
    let fixture = Arc::new(ReplayFixture::example().with_latency(5_000));
    let workflow = crossposter_workflow(fixture.clone(), fixture, &Platform::ALL).unwrap();
    let runtime = FlowRuntime::with_config(
        Arc::new(workflow),
        RuntimeConfig::default().with_timeout(Duration::from_millis(200)),
    );

    let started = std::time::Instant::now();
    let err = runtime.run(source_draft()).await.unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {:?}", err);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_cancel_stops_pending_lookups() {
    let fixture = Arc::new(ReplayFixture::example().with_latency(2_000));
    let workflow = crossposter_workflow(fixture.clone(), fixture, &Platform::ALL).unwrap();
    let handle = FlowRuntime::new(workflow).start(source_draft()).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();

    let err = tokio::time::timeout(Duration::from_secs(1), handle.result())
        .await
        .expect("cancelled run should resolve promptly")
        .unwrap_err();
    assert!(matches!(err, FlowError::Cancelled));
}

#[test]
fn test_no_platforms_is_a_definition_error() {
    let fixture = Arc::new(ReplayFixture::example());
    let err = crossposter_workflow(fixture.clone(), fixture, &[]).err().unwrap();
    assert_eq!(
        err,
        DefinitionError::InvalidJoinCount {
            join: HANDLES_JOIN.to_string()
        }
    );
}

#[test]
fn test_example_fixture_survives_json() {
    let fixture = ReplayFixture::example();
    let json = fixture.to_json_pretty().unwrap();
    assert!(json.contains("\"twitter\""));
    assert_eq!(ReplayFixture::from_json(&json).unwrap(), fixture);
}
