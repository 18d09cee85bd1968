use crate::executor::Scheduler;
use crate::handle::{ProgressStream, RunHandle};
use crate::registry::Workflow;
use flowcore::{tag_name, Event, FlowError, ProgressEmitter, RunId};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Starts runs of one validated workflow.
pub struct FlowRuntime<E: Event> {
    workflow: Arc<Workflow<E>>,
    config: RuntimeConfig,
}

impl<E: Event> FlowRuntime<E> {
    /// Create a runtime with default settings
    pub fn new(workflow: Workflow<E>) -> Self {
        Self::with_config(Arc::new(workflow), RuntimeConfig::default())
    }

    /// Create a runtime around a shared workflow with custom configuration
    pub fn with_config(workflow: Arc<Workflow<E>>, config: RuntimeConfig) -> Self {
        Self { workflow, config }
    }

    pub fn workflow(&self) -> &Arc<Workflow<E>> {
        &self.workflow
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Start a run seeded with `input`, which must carry the workflow's start tag.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, input: E) -> Result<RunHandle<E>, FlowError> {
        if input.tag() != self.workflow.start_tag() {
            return Err(FlowError::InvalidStart {
                expected: tag_name(&self.workflow.start_tag()),
                actual: tag_name(&input.tag()),
            });
        }

        let run_id = RunId::new_v4();
        let (progress, receiver) = ProgressEmitter::channel(run_id, self.config.progress_capacity);
        let cancellation = CancellationToken::new();

        let scheduler = Scheduler::new(
            Arc::clone(&self.workflow),
            self.config.clone(),
            progress,
            cancellation.clone(),
        );
        let task = tokio::spawn(scheduler.run(input));

        Ok(RunHandle::new(
            run_id,
            ProgressStream::new(receiver),
            task,
            cancellation,
        ))
    }

    /// Start a run and wait for its result, ignoring progress.
    pub async fn run(&self, input: E) -> Result<E, FlowError> {
        self.start(input)?.result().await
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Wall-clock budget for one run, measured from its start.
    pub run_timeout: Duration,
    /// Slots in each run's progress ring.
    pub progress_capacity: usize,
}

impl RuntimeConfig {
    pub const TIMEOUT_ENV: &'static str = "FLOW_RUN_TIMEOUT_SECS";
    pub const CAPACITY_ENV: &'static str = "FLOW_PROGRESS_CAPACITY";

    /// Defaults overridden by `FLOW_RUN_TIMEOUT_SECS` and `FLOW_PROGRESS_CAPACITY`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = env_number::<u64>(Self::TIMEOUT_ENV) {
            config.run_timeout = Duration::from_secs(secs);
        }
        if let Some(capacity) = env_number::<usize>(Self::CAPACITY_ENV) {
            config.progress_capacity = capacity;
        }

        config
    }

    pub fn with_timeout(mut self, run_timeout: Duration) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    pub fn with_progress_capacity(mut self, progress_capacity: usize) -> Self {
        self.progress_capacity = progress_capacity.max(1);
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            run_timeout: Duration::from_secs(30),
            progress_capacity: 1000,
        }
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid {}={:?}, using default", name, raw);
            None
        }
    }
}
