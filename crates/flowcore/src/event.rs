use std::fmt::Debug;
use std::hash::Hash;

/// A payload routed between steps.
///
/// Each workflow defines its events as one closed enum and a matching
/// fieldless (or `Copy`) tag enum; the scheduler routes purely on [`Event::tag`].
pub trait Event: Debug + Send + 'static {
    /// Closed enumeration of routing tags for this workflow.
    type Tag: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn tag(&self) -> Self::Tag;
}

/// Render a tag for error messages and logs.
pub fn tag_name<T: Debug>(tag: &T) -> String {
    format!("{:?}", tag)
}

/// Events returned by one step invocation, in emission order.
#[derive(Debug)]
pub struct StepOutput<E> {
    events: Vec<E>,
}

impl<E> StepOutput<E> {
    /// Nothing further is produced.
    pub fn none() -> Self {
        Self { events: Vec::new() }
    }

    /// Exactly one event.
    pub fn emit(event: E) -> Self {
        Self {
            events: vec![event],
        }
    }

    /// Several events, routed independently in the given order.
    pub fn fan_out(events: impl IntoIterator<Item = E>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn into_events(self) -> Vec<E> {
        self.events
    }
}

impl<E> Default for StepOutput<E> {
    fn default() -> Self {
        Self::none()
    }
}

/// An event on its way back to the scheduler, tagged with the step that produced it.
#[derive(Debug)]
pub struct Emission<E> {
    pub source: String,
    pub event: E,
}
