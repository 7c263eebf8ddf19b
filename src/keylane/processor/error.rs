//! Engine error types with context preservation
//!
//! Task-level failures never surface here — they are classified at the
//! pipeline boundary (`TaskOutcome`) and reported through metrics. These
//! errors cover the engine's own lifecycle: construction, submission, and
//! configuration.

use std::error::Error;

use crate::keylane::config::ConfigError;

/// Errors surfaced by the partition processing engine
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// A worker unit failed to start (thread spawn or stage construction)
    #[error("worker {scope} failed to start: {source}")]
    WorkerStartFailed {
        scope: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },

    /// The unit's pending queue is saturated; the feeding side must back off
    #[error("pending queue full for unit {scope} (capacity {capacity})")]
    QueueFull { scope: String, capacity: usize },

    /// Task submitted to a unit that is no longer accepting work
    #[error("unit {scope} is not accepting tasks (state: {state})")]
    UnitNotRunning { scope: String, state: &'static str },

    /// Configuration rejected during construction
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
