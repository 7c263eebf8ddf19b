//! The user-facing processing contract
//!
//! Applications plug into the engine as a chain of processing stages. A
//! `StageFactory` is registered once and invoked exactly once per worker, on
//! that worker's own thread, to build the stage instance that will handle
//! every task routed to that worker for the worker's lifetime. Because the
//! instance never leaves its thread it is deliberately not required to be
//! `Send`: stages may hold sockets, caches, or native/sandboxed execution
//! contexts that cannot be shared.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::error::Error;

use crate::keylane::processor::scope::ThreadScope;
use crate::keylane::processor::task::{TaskRequest, TopicPartition};

/// Failure reported by a processing stage for one task
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The stage could not process this task
    #[error("task processing failed: {0}")]
    Failed(#[source] Box<dyn Error + Send + Sync>),

    /// The stage observed a shutdown/interruption condition mid-task
    #[error("task processing interrupted")]
    Interrupted,
}

impl StageError {
    /// Wrap any error as a task-level failure
    pub fn failed(source: impl Error + Send + Sync + 'static) -> Self {
        StageError::Failed(Box::new(source))
    }

    /// Task-level failure from a plain message
    pub fn message(message: impl Into<String>) -> Self {
        StageError::Failed(message.into().into())
    }
}

/// Accumulating context passed through the stage chain with each task
///
/// Carries the task's transport position plus a string attribute map that
/// earlier stages can populate for later ones (e.g. a decode stage recording
/// the schema version it saw).
#[derive(Debug)]
pub struct ProcessingContext {
    subpartition: usize,
    topic_partition: TopicPartition,
    offset: i64,
    record_timestamp: Option<DateTime<Utc>>,
    attributes: HashMap<String, String>,
}

impl ProcessingContext {
    pub(crate) fn new(scope: &ThreadScope, task: &TaskRequest) -> Self {
        Self {
            subpartition: scope.subpartition(),
            topic_partition: task.topic_partition().clone(),
            offset: task.offset(),
            record_timestamp: task.record_timestamp(),
            attributes: HashMap::new(),
        }
    }

    /// Index of the worker unit processing this task
    pub fn subpartition(&self) -> usize {
        self.subpartition
    }

    pub fn topic_partition(&self) -> &TopicPartition {
        &self.topic_partition
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn record_timestamp(&self) -> Option<DateTime<Utc>> {
        self.record_timestamp
    }

    /// Attach an attribute visible to downstream stages
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }
}

/// One stage of task processing, confined to a single worker thread
///
/// Stages run in declaration order; returning an error stops the chain for
/// that task only. `close` runs at worker shutdown in reverse construction
/// order so resources unwind the way they were acquired.
pub trait TaskProcessor {
    /// Process one task
    fn process(&mut self, context: &mut ProcessingContext, task: &TaskRequest)
        -> Result<(), StageError>;

    /// Stage name for logs and failure classification
    fn name(&self) -> &str {
        "anonymous"
    }

    /// Release resources held by this stage instance
    fn close(&mut self) {}
}

/// Per-worker factory for a processing stage
///
/// `create` is called exactly once per worker unit, on the worker's thread,
/// before the unit starts taking tasks. `destroy` is called on the same
/// thread after the unit's pipeline has closed, for factories that track
/// per-worker resources themselves.
pub trait StageFactory: Send + Sync {
    /// Build the thread-confined stage instance for one worker
    fn create(
        &self,
        scope: &ThreadScope,
    ) -> Result<Box<dyn TaskProcessor>, Box<dyn Error + Send + Sync>>;

    /// Per-worker cleanup hook, invoked after the worker's stages closed
    fn destroy(&self, _scope: &ThreadScope) {}
}

/// Closures producing a stage per worker act as factories directly
impl<F> StageFactory for F
where
    F: Fn(&ThreadScope) -> Box<dyn TaskProcessor> + Send + Sync,
{
    fn create(
        &self,
        scope: &ThreadScope,
    ) -> Result<Box<dyn TaskProcessor>, Box<dyn Error + Send + Sync>> {
        Ok(self(scope))
    }
}
