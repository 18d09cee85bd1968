//! Core abstractions for the flow engine
//!
//! This crate provides the fundamental types and traits that all other
//! components depend on: events and their tags, the step trait, the
//! run-scoped context, progress events and the error taxonomy.

mod context;
mod error;
mod event;
pub mod events;
mod step;

pub use context::{Context, RunScope};
pub use error::{DefinitionError, FlowError, JoinError, StepError};
pub use event::{tag_name, Emission, Event, StepOutput};
pub use events::*;
pub use step::{FnStep, Step};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
