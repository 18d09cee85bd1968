use crate::executor::panic_message;
use flowcore::{tag_name, Event, JoinError};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

type KeyFn<E> = Arc<dyn Fn(&E) -> String + Send + Sync>;
type CombineFn<E> = Arc<dyn Fn(Vec<E>) -> E + Send + Sync>;

/// Declaration of a fan-in point: collect `required` events carrying any of
/// the accepted tags, then release one combined event tagged `produces`.
pub struct JoinDef<E: Event> {
    name: String,
    accepts: Vec<E::Tag>,
    produces: E::Tag,
    required: usize,
    key_fn: Option<KeyFn<E>>,
    combine: CombineFn<E>,
}

impl<E: Event> JoinDef<E> {
    /// `combine` receives the constituent events in arrival order.
    pub fn new<F>(
        name: impl Into<String>,
        accepts: impl IntoIterator<Item = E::Tag>,
        required: usize,
        produces: E::Tag,
        combine: F,
    ) -> Self
    where
        F: Fn(Vec<E>) -> E + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            accepts: accepts.into_iter().collect(),
            produces,
            required,
            key_fn: None,
            combine: Arc::new(combine),
        }
    }

    /// Partition accumulation by a key derived from each event, so one
    /// declaration can serve several independent fan-ins in the same run.
    pub fn keyed_by<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&E) -> String + Send + Sync + 'static,
    {
        self.key_fn = Some(Arc::new(key_fn));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accepts(&self) -> &[E::Tag] {
        &self.accepts
    }

    pub fn produces(&self) -> E::Tag {
        self.produces
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn is_keyed(&self) -> bool {
        self.key_fn.is_some()
    }

    pub fn key_for(&self, event: &E) -> String {
        match &self.key_fn {
            Some(key_fn) => key_fn(event),
            None => self.name.clone(),
        }
    }
}

/// A join that fired.
#[derive(Debug)]
pub struct JoinRelease<E> {
    pub key: String,
    pub count: usize,
    pub event: E,
}

/// A join key still waiting for events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingJoin {
    pub join: String,
    pub key: String,
    pub received: usize,
    pub required: usize,
}

impl fmt::Display for PendingJoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.join == self.key {
            write!(f, "{} {}/{}", self.join, self.received, self.required)
        } else {
            write!(f, "{}[{}] {}/{}", self.join, self.key, self.received, self.required)
        }
    }
}

struct Slot<E> {
    required: usize,
    events: Vec<E>,
}

/// Per-run accumulator for every join key.
///
/// Owned by the run's scheduler, which is its only writer, so each
/// `accumulate` call runs its count check and release as one step.
pub struct JoinBuffer<E: Event> {
    slots: HashMap<(String, String), Slot<E>>,
    released: HashSet<(String, String)>,
}

impl<E: Event> JoinBuffer<E> {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            released: HashSet::new(),
        }
    }

    /// Add `event` to its key's buffer. Returns the combined event the moment
    /// the required count is reached, and clears that key's buffer.
    ///
    /// Accumulating into a key that already released is an error, and so is
    /// a panic in the join's key or combine function.
    pub fn accumulate(
        &mut self,
        join: &JoinDef<E>,
        event: E,
    ) -> Result<Option<JoinRelease<E>>, JoinError> {
        let key = guarded(join, || join.key_for(&event))?;
        let slot_key = (join.name.clone(), key);

        if self.released.contains(&slot_key) {
            return Err(JoinError::AlreadyReleased {
                join: slot_key.0,
                key: slot_key.1,
            });
        }

        let slot = self.slots.entry(slot_key.clone()).or_insert_with(|| Slot {
            required: join.required,
            events: Vec::new(),
        });
        slot.events.push(event);

        tracing::debug!(
            join = %slot_key.0,
            key = %slot_key.1,
            received = slot.events.len(),
            required = slot.required,
            "join accumulated event"
        );

        if slot.events.len() < slot.required {
            return Ok(None);
        }

        let Some(slot) = self.slots.remove(&slot_key) else {
            return Ok(None);
        };
        let count = slot.events.len();
        self.released.insert(slot_key.clone());
        let combined = guarded(join, || (join.combine)(slot.events))?;

        if combined.tag() != join.produces {
            return Err(JoinError::WrongTag {
                join: slot_key.0,
                expected: tag_name(&join.produces),
                actual: tag_name(&combined.tag()),
            });
        }

        Ok(Some(JoinRelease {
            key: slot_key.1,
            count,
            event: combined,
        }))
    }

    pub fn is_released(&self, join: &str, key: &str) -> bool {
        self.released.contains(&(join.to_string(), key.to_string()))
    }

    /// Keys that started accumulating but never reached their count, sorted.
    pub fn pending(&self) -> Vec<PendingJoin> {
        let mut pending: Vec<_> = self
            .slots
            .iter()
            .map(|((join, key), slot)| PendingJoin {
                join: join.clone(),
                key: key.clone(),
                received: slot.events.len(),
                required: slot.required,
            })
            .collect();
        pending.sort_by(|a, b| (&a.join, &a.key).cmp(&(&b.join, &b.key)));
        pending
    }

    /// Like [`pending`](Self::pending), but also lists unkeyed joins from
    /// `declared` that never received a single event.
    pub fn pending_for(&self, declared: &[JoinDef<E>]) -> Vec<PendingJoin> {
        let mut pending = self.pending();
        for join in declared.iter().filter(|j| !j.is_keyed()) {
            let name = join.name();
            let touched = self.is_released(name, name) || pending.iter().any(|p| p.join == name);
            if !touched {
                pending.push(PendingJoin {
                    join: name.to_string(),
                    key: name.to_string(),
                    received: 0,
                    required: join.required(),
                });
            }
        }
        pending
    }
}

/// Run a user-supplied join callback, turning a panic into an error.
fn guarded<E: Event, T>(join: &JoinDef<E>, f: impl FnOnce() -> T) -> Result<T, JoinError> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|panic| JoinError::Panicked {
        join: join.name.clone(),
        message: panic_message(panic),
    })
}

impl<E: Event> Default for JoinBuffer<E> {
    fn default() -> Self {
        Self::new()
    }
}
