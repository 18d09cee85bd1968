use flowcore::{Event, FlowError, ProgressEvent, RunId};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// External handle on one running workflow.
pub struct RunHandle<E: Event> {
    run_id: RunId,
    progress: Option<ProgressStream>,
    task: JoinHandle<Result<E, FlowError>>,
    cancellation: CancellationToken,
}

impl<E: Event> RunHandle<E> {
    pub(crate) fn new(
        run_id: RunId,
        progress: ProgressStream,
        task: JoinHandle<Result<E, FlowError>>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            run_id,
            progress: Some(progress),
            task,
            cancellation,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// The run's progress, from its first event. Available once; later calls
    /// return `None`.
    pub fn progress(&mut self) -> Option<ProgressStream> {
        self.progress.take()
    }

    /// Ask the run to stop. `result` then resolves with `FlowError::Cancelled`
    /// unless the run already finished.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the terminal event, or the run's failure.
    pub async fn result(self) -> Result<E, FlowError> {
        self.task
            .await
            .map_err(|e| FlowError::Execution(format!("Run task join error: {}", e)))?
    }
}

/// Lazy, finite sequence of a run's progress events.
///
/// Ends after yielding the `RunFinished` event. The underlying ring keeps
/// the newest `progress_capacity` events; if this consumer falls behind,
/// the oldest undelivered events are skipped and counted in [`dropped`].
///
/// [`dropped`]: ProgressStream::dropped
pub struct ProgressStream {
    receiver: broadcast::Receiver<ProgressEvent>,
    finished: bool,
    dropped: u64,
}

impl ProgressStream {
    pub(crate) fn new(receiver: broadcast::Receiver<ProgressEvent>) -> Self {
        Self {
            receiver,
            finished: false,
            dropped: 0,
        }
    }

    /// Next event, or `None` once the run has finished.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        if self.finished {
            return None;
        }

        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if event.is_final() {
                        self.finished = true;
                    }
                    return Some(event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    self.dropped += skipped;
                    tracing::warn!(skipped, "Progress consumer lagged; oldest events dropped");
                }
                Err(RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    /// Events skipped so far because this consumer lagged.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn into_stream(self) -> BoxStream<'static, ProgressEvent> {
        stream::unfold(self, |mut progress| async move {
            progress.recv().await.map(|event| (event, progress))
        })
        .boxed()
    }
}
