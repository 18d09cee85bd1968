use crate::join::JoinBuffer;
use crate::registry::{Route, Workflow};
use crate::runtime::RuntimeConfig;
use flowcore::{
    tag_name, Emission, Event, FlowError, ProgressEmitter, ProgressKind, RunOutcome,
    RunScope, StepError,
};
use futures::FutureExt;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// How one step invocation ended.
struct StepReport {
    step: String,
    result: Result<usize, StepFailure>,
    duration_ms: u64,
}

enum StepFailure {
    Error(StepError),
    Panic(String),
}

/// Drives one run of a workflow to its terminal event.
///
/// The scheduler task is the single owner of the event queue and the join
/// buffer. Step invocations run as independent tasks and hand their events
/// back over one channel, so each step's emissions arrive in the order it
/// produced them.
pub(crate) struct Scheduler<E: Event> {
    workflow: Arc<Workflow<E>>,
    config: RuntimeConfig,
    progress: ProgressEmitter,
    cancellation: CancellationToken,
}

impl<E: Event> Scheduler<E> {
    pub(crate) fn new(
        workflow: Arc<Workflow<E>>,
        config: RuntimeConfig,
        progress: ProgressEmitter,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            workflow,
            config,
            progress,
            cancellation,
        }
    }

    pub(crate) async fn run(self, start: E) -> Result<E, FlowError> {
        let run_id = self.progress.run_id();
        let started = Instant::now();

        self.progress.emit(ProgressKind::RunStarted {
            workflow: self.workflow.name().to_string(),
        });
        tracing::info!(run_id = %run_id, workflow = %self.workflow.name(), "Starting run");

        let result = self.drive(start).await;

        // Signal any step still running; their output is no longer routed.
        self.cancellation.cancel();

        let duration_ms = started.elapsed().as_millis() as u64;
        let outcome = match &result {
            Ok(_) => {
                tracing::info!(run_id = %run_id, duration_ms, "Run completed");
                RunOutcome::Completed
            }
            Err(FlowError::Timeout { .. }) => {
                tracing::warn!(run_id = %run_id, duration_ms, "Run timed out");
                RunOutcome::TimedOut
            }
            Err(FlowError::Cancelled) => {
                tracing::info!(run_id = %run_id, duration_ms, "Run cancelled");
                RunOutcome::Cancelled
            }
            Err(e) => {
                tracing::error!(run_id = %run_id, duration_ms, "Run failed: {}", e);
                RunOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };
        self.progress.emit(ProgressKind::RunFinished { outcome });

        result
    }

    async fn drive(&self, start: E) -> Result<E, FlowError> {
        let (sender, mut emissions) = mpsc::unbounded_channel::<Emission<E>>();
        let scope = RunScope::new(sender, self.progress.clone(), self.cancellation.clone());

        let mut queue = VecDeque::from([start]);
        let mut joins = JoinBuffer::new();
        let mut tasks: JoinSet<StepReport> = JoinSet::new();

        let deadline = tokio::time::sleep(self.config.run_timeout);
        tokio::pin!(deadline);

        let result = 'run: loop {
            while let Some(event) = queue.pop_front() {
                match self.dispatch(event, &scope, &mut joins, &mut tasks, &mut queue) {
                    Ok(Some(terminal)) => break 'run Ok(terminal),
                    Ok(None) => {}
                    Err(e) => break 'run Err(e),
                }
            }

            if tasks.is_empty() {
                // A finished task has already sent everything it emitted.
                let mut drained = false;
                while let Ok(emission) = emissions.try_recv() {
                    drained = true;
                    match self.accept(emission, &mut queue) {
                        Ok(Some(terminal)) => break 'run Ok(terminal),
                        Ok(None) => {}
                        Err(e) => break 'run Err(e),
                    }
                }
                if drained {
                    continue;
                }

                let pending = self.pending(&joins);
                tracing::warn!(
                    run_id = %self.progress.run_id(),
                    pending = ?pending,
                    "Run stalled without a terminal event"
                );
                break 'run Err(FlowError::DeadEnd { pending });
            }

            tokio::select! {
                biased;

                _ = &mut deadline => {
                    break 'run Err(FlowError::Timeout {
                        after_ms: self.config.run_timeout.as_millis() as u64,
                        pending: self.pending(&joins),
                    });
                }

                _ = self.cancellation.cancelled() => break 'run Err(FlowError::Cancelled),

                Some(emission) = emissions.recv() => {
                    match self.accept(emission, &mut queue) {
                        Ok(Some(terminal)) => break 'run Ok(terminal),
                        Ok(None) => {}
                        Err(e) => break 'run Err(e),
                    }
                }

                Some(joined) = tasks.join_next() => {
                    if let Err(e) = self.settle(joined) {
                        break 'run Err(e);
                    }
                }
            }
        };

        if !tasks.is_empty() {
            tracing::debug!(
                run_id = %self.progress.run_id(),
                in_flight = tasks.len(),
                "Aborting in-flight steps"
            );
            self.cancellation.cancel();
            tasks.abort_all();
        }

        result
    }

    /// Route one queued event. Returns the event itself if it is terminal.
    fn dispatch(
        &self,
        event: E,
        scope: &RunScope<E>,
        joins: &mut JoinBuffer<E>,
        tasks: &mut JoinSet<StepReport>,
        queue: &mut VecDeque<E>,
    ) -> Result<Option<E>, FlowError> {
        let tag = event.tag();
        if tag == self.workflow.terminal_tag() {
            return Ok(Some(event));
        }

        match self.workflow.route(tag) {
            Some(Route::Step(index)) => {
                self.launch(index, event, scope, tasks);
                Ok(None)
            }
            Some(Route::Join(index)) => {
                let join = &self.workflow.joins[index];
                let Some(release) = joins.accumulate(join, event)? else {
                    return Ok(None);
                };

                tracing::debug!(
                    run_id = %self.progress.run_id(),
                    join = %join.name(),
                    key = %release.key,
                    count = release.count,
                    "Join released"
                );
                self.progress.emit(ProgressKind::JoinReleased {
                    join: join.name().to_string(),
                    key: release.key,
                    count: release.count,
                });

                if release.event.tag() == self.workflow.terminal_tag() {
                    Ok(Some(release.event))
                } else {
                    queue.push_back(release.event);
                    Ok(None)
                }
            }
            None => Err(FlowError::Execution(format!(
                "No route for event tag {}",
                tag_name(&tag)
            ))),
        }
    }

    /// Spawn one step invocation.
    fn launch(&self, index: usize, event: E, scope: &RunScope<E>, tasks: &mut JoinSet<StepReport>) {
        let registered = &self.workflow.steps[index];
        let step = Arc::clone(&registered.step);
        let name = registered.name.clone();
        let step_ctx = scope.context(&name);
        let progress = self.progress.clone();

        tracing::debug!(
            run_id = %self.progress.run_id(),
            step = %name,
            tag = ?event.tag(),
            "Launching step"
        );
        progress.emit(ProgressKind::StepStarted { step: name.clone() });

        tasks.spawn(async move {
            let started = Instant::now();
            let outcome = AssertUnwindSafe(step.run(step_ctx.clone(), event))
                .catch_unwind()
                .await;

            let result = match outcome {
                Ok(Ok(output)) => {
                    let emitted = output.len();
                    for event in output.into_events() {
                        if step_ctx.send_event(event).is_err() {
                            break;
                        }
                    }
                    Ok(emitted)
                }
                Ok(Err(e)) => Err(StepFailure::Error(e)),
                Err(panic) => Err(StepFailure::Panic(panic_message(panic))),
            };

            let duration_ms = started.elapsed().as_millis() as u64;
            match &result {
                Ok(emitted) => progress.emit(ProgressKind::StepCompleted {
                    step: name.clone(),
                    emitted: *emitted,
                    duration_ms,
                }),
                Err(failure) => progress.emit(ProgressKind::StepFailed {
                    step: name.clone(),
                    error: failure.to_string(),
                }),
            }

            StepReport {
                step: name,
                result,
                duration_ms,
            }
        });
    }

    /// Check an emitted event against its step's declaration and queue it.
    fn accept(&self, emission: Emission<E>, queue: &mut VecDeque<E>) -> Result<Option<E>, FlowError> {
        let tag = emission.event.tag();
        let declared = self
            .workflow
            .step_named(&emission.source)
            .map(|step| step.produces.contains(&tag))
            .unwrap_or(false);

        if !declared {
            return Err(FlowError::UndeclaredOutput {
                step: emission.source,
                tag: tag_name(&tag),
            });
        }

        tracing::debug!(
            run_id = %self.progress.run_id(),
            step = %emission.source,
            tag = ?tag,
            "Event emitted"
        );

        if tag == self.workflow.terminal_tag() {
            return Ok(Some(emission.event));
        }
        queue.push_back(emission.event);
        Ok(None)
    }

    fn settle(&self, joined: Result<StepReport, JoinError>) -> Result<(), FlowError> {
        let report = joined.map_err(|e| FlowError::Execution(format!("Task join error: {}", e)))?;

        match report.result {
            Ok(emitted) => {
                tracing::debug!(
                    run_id = %self.progress.run_id(),
                    step = %report.step,
                    emitted,
                    duration_ms = report.duration_ms,
                    "Step completed"
                );
                Ok(())
            }
            Err(StepFailure::Error(source)) => {
                tracing::error!(
                    run_id = %self.progress.run_id(),
                    step = %report.step,
                    "Step failed: {}",
                    source
                );
                Err(FlowError::StepFailed {
                    step: report.step,
                    source,
                })
            }
            Err(StepFailure::Panic(message)) => {
                tracing::error!(
                    run_id = %self.progress.run_id(),
                    step = %report.step,
                    "Step panicked: {}",
                    message
                );
                Err(FlowError::StepPanicked {
                    step: report.step,
                    message,
                })
            }
        }
    }

    fn pending(&self, joins: &JoinBuffer<E>) -> Vec<String> {
        joins
            .pending_for(&self.workflow.joins)
            .iter()
            .map(ToString::to_string)
            .collect()
    }
}

impl std::fmt::Display for StepFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepFailure::Error(e) => write!(f, "{}", e),
            StepFailure::Panic(message) => write!(f, "panicked: {}", message),
        }
    }
}

pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
