use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type RunId = Uuid;

/// One item of a run's progress stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub run_id: RunId,
    pub timestamp: DateTime<Utc>,
    pub kind: ProgressKind,
}

impl ProgressEvent {
    /// The text of a step's `emit_progress` call, if this is one.
    pub fn message(&self) -> Option<&str> {
        match &self.kind {
            ProgressKind::Message { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self.kind, ProgressKind::RunFinished { .. })
    }
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressKind {
    RunStarted {
        workflow: String,
    },
    StepStarted {
        step: String,
    },
    StepCompleted {
        step: String,
        emitted: usize,
        duration_ms: u64,
    },
    StepFailed {
        step: String,
        error: String,
    },
    Message {
        step: String,
        message: String,
    },
    JoinReleased {
        join: String,
        key: String,
        count: usize,
    },
    RunFinished {
        outcome: RunOutcome,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Failed { error: String },
    TimedOut,
    Cancelled,
}

/// Sending half of a run's progress channel.
///
/// Sends never block: the channel is a fixed-size ring and a consumer that
/// falls behind loses the oldest entries.
#[derive(Clone)]
pub struct ProgressEmitter {
    run_id: RunId,
    sender: broadcast::Sender<ProgressEvent>,
}

impl ProgressEmitter {
    pub fn new(run_id: RunId, sender: broadcast::Sender<ProgressEvent>) -> Self {
        Self { run_id, sender }
    }

    /// Create a run's channel together with the receiver that sees it from the start.
    pub fn channel(run_id: RunId, capacity: usize) -> (Self, broadcast::Receiver<ProgressEvent>) {
        let (sender, receiver) = broadcast::channel(capacity.max(1));
        (Self::new(run_id, sender), receiver)
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn emit(&self, kind: ProgressKind) {
        // No receiver left means nobody is listening; that is not an error.
        let _ = self.sender.send(ProgressEvent {
            run_id: self.run_id,
            timestamp: Utc::now(),
            kind,
        });
    }

    pub fn message(&self, step: impl Into<String>, message: impl Into<String>) {
        self.emit(ProgressKind::Message {
            step: step.into(),
            message: message.into(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }
}
