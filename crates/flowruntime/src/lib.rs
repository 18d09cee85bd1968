//! Workflow execution runtime
//!
//! This crate provides the engine that runs event-driven workflows: the
//! step registry that validates a graph at build time, the scheduler that
//! routes events between concurrently running steps, the join buffer for
//! fan-in, and the run handle that streams progress to an observer.

mod executor;
mod handle;
mod join;
mod registry;
mod runtime;

pub use handle::{ProgressStream, RunHandle};
pub use join::{JoinBuffer, JoinDef, JoinRelease, PendingJoin};
pub use registry::{JoinInfo, StepInfo, StepRegistry, Workflow};
pub use runtime::{FlowRuntime, RuntimeConfig};
