// crates/flowcli/src/main.rs

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use flowcore::{ProgressKind, RunOutcome};
use flowruntime::{FlowRuntime, RuntimeConfig};
use flowsteps::{crossposter_workflow, Platform, PosterEvent, ReplayFixture};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flow")]
#[command(about = "Cross-poster workflow CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn a draft into one post per platform, replaying recorded answers
    Draft {
        /// Path to a replay fixture JSON file
        #[arg(short, long)]
        fixture: PathBuf,

        /// Source draft (defaults to the fixture's draft)
        #[arg(short, long)]
        text: Option<String>,

        /// Platforms to prepare drafts for (repeatable; default: all)
        #[arg(short, long = "platform")]
        platforms: Vec<Platform>,

        /// Run timeout in seconds (overrides FLOW_RUN_TIMEOUT_SECS)
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// List the steps and joins of the cross-poster graph
    Steps {
        #[arg(short, long = "platform")]
        platforms: Vec<Platform>,
    },

    /// Create an example replay fixture
    Init {
        /// Output file path
        #[arg(short, long, default_value = "fixture.json")]
        output: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn enabled_platforms(platforms: Vec<Platform>) -> Vec<Platform> {
    if platforms.is_empty() {
        Platform::ALL.to_vec()
    } else {
        platforms
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Draft {
            fixture,
            text,
            platforms,
            timeout_secs,
            verbose,
        } => {
            init_logging(verbose);
            run_draft(fixture, text, enabled_platforms(platforms), timeout_secs).await?;
        }

        Commands::Steps { platforms } => {
            list_steps(enabled_platforms(platforms))?;
        }

        Commands::Init { output } => {
            create_example_fixture(output)?;
        }
    }

    Ok(())
}

async fn run_draft(
    file: PathBuf,
    text: Option<String>,
    platforms: Vec<Platform>,
    timeout_secs: Option<u64>,
) -> Result<()> {
    println!("🚀 Loading fixture from: {}", file.display());

    let json = std::fs::read_to_string(&file)
        .with_context(|| format!("reading fixture {}", file.display()))?;
    let fixture = ReplayFixture::from_json(&json)
        .with_context(|| format!("parsing fixture {}", file.display()))?;

    let draft = match text.or_else(|| fixture.draft.clone()) {
        Some(draft) => draft,
        None => bail!("no draft given: pass --text or set \"draft\" in the fixture"),
    };

    let fixture = Arc::new(fixture);
    let workflow = crossposter_workflow(fixture.clone(), fixture, &platforms)?;

    let mut config = RuntimeConfig::from_env();
    if let Some(secs) = timeout_secs {
        config = config.with_timeout(Duration::from_secs(secs));
    }

    println!("📋 Workflow: {}", workflow.name());
    println!(
        "   Platforms: {}",
        platforms
            .iter()
            .map(|p| p.display_name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!();

    let runtime = FlowRuntime::with_config(Arc::new(workflow), config);
    let mut handle = runtime.start(PosterEvent::start(draft))?;

    if let Some(progress) = handle.progress() {
        let mut stream = progress.into_stream();
        while let Some(event) = stream.next().await {
            match event.kind {
                ProgressKind::RunStarted { .. } => println!("▶️  Run {} started", event.run_id),
                ProgressKind::StepStarted { step } => println!("  ⚡ Starting step: {}", step),
                ProgressKind::StepCompleted {
                    step, duration_ms, ..
                } => println!("  ✅ Step {} completed in {}ms", step, duration_ms),
                ProgressKind::StepFailed { step, error } => {
                    println!("  ❌ Step {} failed: {}", step, error)
                }
                ProgressKind::Message { step, message } => {
                    println!("     ℹ️  [{}] {}", step, message)
                }
                ProgressKind::JoinReleased { join, count, .. } => {
                    println!("  🔗 Join {} released {} events", join, count)
                }
                ProgressKind::RunFinished { outcome } => match outcome {
                    RunOutcome::Completed => println!("✨ Run completed"),
                    RunOutcome::Failed { error } => println!("💥 Run failed: {}", error),
                    RunOutcome::TimedOut => println!("⏱️  Run timed out"),
                    RunOutcome::Cancelled => println!("🛑 Run cancelled"),
                },
            }
        }
    }

    let drafts = match handle.result().await?.into_drafts() {
        Some(drafts) => drafts,
        None => bail!("run ended without drafts"),
    };

    println!();
    println!("📤 Drafts:");
    for (platform, draft) in &drafts {
        println!("   {}: {}", platform, draft);
    }

    Ok(())
}

fn list_steps(platforms: Vec<Platform>) -> Result<()> {
    let fixture = Arc::new(ReplayFixture::example());
    let workflow = crossposter_workflow(fixture.clone(), fixture, &platforms)?;

    println!("📦 Steps of {}:", workflow.name());
    println!();
    for step in workflow.steps() {
        println!("  • {}", step.name);
        println!("    accepts:  {}", step.accepts.join(", "));
        println!("    produces: {}", step.produces.join(", "));
    }
    for join in workflow.joins() {
        println!("  ⋈ {} (join)", join.name);
        println!("    collects: {} × {}", join.required, join.accepts.join(" | "));
        println!("    produces: {}", join.produces);
    }

    Ok(())
}

fn create_example_fixture(output: PathBuf) -> Result<()> {
    let json = ReplayFixture::example().to_json_pretty()?;
    std::fs::write(&output, json)?;

    println!("✨ Created example fixture: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  flow draft --fixture {}", output.display());

    Ok(())
}
