use crate::event::{Emission, Event};
use crate::events::{ProgressEmitter, RunId};
use crate::StepError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

/// The shared half of a run: store, event channel, progress and
/// cancellation. Owned by the scheduler, which hands each step invocation a
/// [`Context`] labelled with that step's name.
pub struct RunScope<E: Event> {
    run_id: RunId,
    store: Arc<RwLock<HashMap<String, serde_json::Value>>>,
    events: mpsc::UnboundedSender<Emission<E>>,
    progress: ProgressEmitter,
    cancellation: CancellationToken,
}

impl<E: Event> RunScope<E> {
    pub fn new(
        events: mpsc::UnboundedSender<Emission<E>>,
        progress: ProgressEmitter,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            run_id: progress.run_id(),
            store: Arc::new(RwLock::new(HashMap::new())),
            events,
            progress,
            cancellation,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Context for one invocation of `step`. The label is fixed for the
    /// lifetime of the context and all of its clones.
    pub fn context(&self, step: &str) -> Context<E> {
        Context {
            run_id: self.run_id,
            step: Arc::from(step),
            store: Arc::clone(&self.store),
            events: self.events.clone(),
            progress: self.progress.clone(),
            cancellation: self.cancellation.clone(),
        }
    }
}

/// Run-scoped state handed to every step invocation.
///
/// Clones share the key/value store, the progress channel and the
/// cancellation token of their run, and keep the step label they were
/// created with, so progress and emitted events are attributed to the step
/// that produced them.
pub struct Context<E: Event> {
    run_id: RunId,
    step: Arc<str>,
    store: Arc<RwLock<HashMap<String, serde_json::Value>>>,
    events: mpsc::UnboundedSender<Emission<E>>,
    progress: ProgressEmitter,
    cancellation: CancellationToken,
}

impl<E: Event> Clone for Context<E> {
    fn clone(&self) -> Self {
        Self {
            run_id: self.run_id,
            step: Arc::clone(&self.step),
            store: Arc::clone(&self.store),
            events: self.events.clone(),
            progress: self.progress.clone(),
            cancellation: self.cancellation.clone(),
        }
    }
}

impl<E: Event> Context<E> {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn step(&self) -> &str {
        &self.step
    }

    /// Store a value under `key`, replacing any previous value.
    pub async fn set<T: Serialize>(&self, key: impl Into<String>, value: T) -> Result<(), StepError> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|e| StepError::InvalidValue {
            key: key.clone(),
            reason: e.to_string(),
        })?;

        let mut store = self.store.write().await;
        if store.insert(key.clone(), value).is_some() {
            tracing::debug!(run_id = %self.run_id, step = %self.step, key = %key, "context key overwritten");
        }
        Ok(())
    }

    /// Read a raw value. Fails with `MissingKey` if nothing was stored under `key`.
    pub async fn get(&self, key: &str) -> Result<serde_json::Value, StepError> {
        self.store
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StepError::MissingKey(key.to_string()))
    }

    /// Read and deserialize a value.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, StepError> {
        let value = self.get(key).await?;
        serde_json::from_value(value).map_err(|e| StepError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.store.read().await.contains_key(key)
    }

    /// Copy of the whole store.
    pub async fn snapshot(&self) -> HashMap<String, serde_json::Value> {
        self.store.read().await.clone()
    }

    /// Queue a progress message for the run's observer. Never blocks.
    pub fn emit_progress(&self, message: impl Into<String>) {
        self.progress.message(self.step.as_ref(), message);
    }

    /// Route an event immediately, before this step returns.
    pub fn send_event(&self, event: E) -> Result<(), StepError> {
        self.events
            .send(Emission {
                source: self.step.to_string(),
                event,
            })
            .map_err(|_| StepError::RunClosed)
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Cancellation checkpoint.
    pub fn checkpoint(&self) -> Result<(), StepError> {
        if self.is_cancelled() {
            Err(StepError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Drive `fut` unless the run is cancelled first.
    pub async fn cancellable<F>(&self, fut: F) -> Result<F::Output, StepError>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(StepError::Cancelled),
            output = fut => Ok(output),
        }
    }
}
