// crates/flowcore/src/events/mod.rs

mod progress;

pub use progress::{ProgressEmitter, ProgressEvent, ProgressKind, RunId, RunOutcome};
