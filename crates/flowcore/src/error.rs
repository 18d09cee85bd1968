use thiserror::Error;

/// Failure of a single run, as observed through the run handle.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    #[error("Start event has tag {actual}, workflow starts on {expected}")]
    InvalidStart { expected: String, actual: String },

    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: StepError,
    },

    #[error("Step '{step}' panicked: {message}")]
    StepPanicked { step: String, message: String },

    #[error("Step '{step}' emitted undeclared event tag {tag}")]
    UndeclaredOutput { step: String, tag: String },

    #[error("Join error: {0}")]
    Join(#[from] JoinError),

    #[error("Run stalled with no terminal event (incomplete joins: {})", render_pending(.pending))]
    DeadEnd { pending: Vec<String> },

    #[error("Run timed out after {after_ms}ms (incomplete joins: {})", render_pending(.pending))]
    Timeout { after_ms: u64, pending: Vec<String> },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Execution error: {0}")]
    Execution(String),
}

impl FlowError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FlowError::Timeout { .. })
    }
}

fn render_pending(pending: &[String]) -> String {
    if pending.is_empty() {
        "none".to_string()
    } else {
        pending.join(", ")
    }
}

/// Errors raised by step handlers and by the context they run against.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("Missing context key: {0}")]
    MissingKey(String),

    #[error("Invalid value for context key '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Step '{step}' cannot handle event tag {tag}")]
    UnexpectedEvent { step: String, tag: String },

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Run is no longer accepting events")]
    RunClosed,
}

/// Graph misconfiguration detected while building a workflow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("Step '{step}' produces {tag}, which no step or join accepts")]
    DanglingOutput { step: String, tag: String },

    #[error("Step '{step}' accepts {tag}, which nothing produces")]
    UnproducedInput { step: String, tag: String },

    #[error("Tag {tag} is claimed by both '{first}' and '{second}'")]
    AmbiguousRouting {
        tag: String,
        first: String,
        second: String,
    },

    #[error("Step '{0}' is registered twice")]
    DuplicateStep(String),

    #[error("Join '{0}' is declared twice")]
    DuplicateJoin(String),

    #[error("Join '{join}' must require at least one event and accept at least one tag")]
    InvalidJoinCount { join: String },

    #[error("Step '{step}' must accept at least one tag")]
    NoAcceptedTags { step: String },

    #[error("No step accepts the start tag {0}")]
    NoStartConsumer(String),

    #[error("Terminal tag {0} is not reachable from the start tag")]
    TerminalUnreachable(String),

    #[error("Terminal tag {terminal} cannot be consumed (claimed by '{step}')")]
    TerminalConsumed { terminal: String, step: String },
}

/// Violations of the join buffer's exactly-once contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    #[error("Join '{join}' already released key '{key}'")]
    AlreadyReleased { join: String, key: String },

    #[error("Join '{join}' panicked: {message}")]
    Panicked { join: String, message: String },

    #[error("Join '{join}' combined into tag {actual}, expected {expected}")]
    WrongTag {
        join: String,
        expected: String,
        actual: String,
    },
}
