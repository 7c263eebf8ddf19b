//! Per-worker execution pipeline over the user stage chain
//!
//! A `StageSet` is the shared, immutable list of stage factories registered
//! by the application. Each worker unit materializes it once, on its own
//! thread, into a `ProcessPipeline` — the thread-confined chain of stage
//! instances that executes a single task end to end. Stage errors are
//! caught and classified at the pipeline boundary so a poison task never
//! kills its worker.

use log::{debug, warn};
use std::sync::Arc;
use std::time::Instant;

use crate::keylane::processor::error::ProcessorError;
use crate::keylane::processor::metrics::UnitMetrics;
use crate::keylane::processor::scope::ThreadScope;
use crate::keylane::processor::stage::{
    ProcessingContext, StageError, StageFactory, TaskProcessor,
};
use crate::keylane::processor::task::TaskRequest;

/// Classification of one task's trip through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Every stage completed
    Completed,
    /// A stage reported a task-level failure; the worker moves on
    Failed,
    /// A stage observed an interruption (shutdown in progress)
    Interrupted,
}

/// Immutable, shareable chain of stage factories
///
/// Built once by the application and shared by every unit of every
/// partition; each unit turns it into its own pipeline.
#[derive(Default, Clone)]
pub struct StageSet {
    factories: Vec<Arc<dyn StageFactory>>,
}

impl StageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage factory; stages execute in registration order
    pub fn stage(mut self, factory: impl StageFactory + 'static) -> Self {
        self.factories.push(Arc::new(factory));
        self
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Materialize the chain for one worker; must run on that worker's thread
    pub(crate) fn build_pipeline(
        &self,
        scope: &ThreadScope,
        metrics: Arc<UnitMetrics>,
    ) -> Result<ProcessPipeline, ProcessorError> {
        let mut stages = Vec::with_capacity(self.factories.len());
        for factory in &self.factories {
            match factory.create(scope) {
                Ok(stage) => stages.push(stage),
                Err(source) => {
                    // Unwind the stages built so far, newest first.
                    for mut built in stages.into_iter().rev() {
                        built.close();
                    }
                    return Err(ProcessorError::WorkerStartFailed {
                        scope: scope.to_string(),
                        source,
                    });
                }
            }
        }
        debug!(
            "Pipeline {}: built {} stage(s)",
            scope,
            stages.len()
        );
        Ok(ProcessPipeline {
            scope: scope.clone(),
            stages,
            metrics,
        })
    }

    /// Per-worker factory cleanup, run after the worker's pipeline closed
    pub(crate) fn destroy_scope(&self, scope: &ThreadScope) {
        for factory in &self.factories {
            factory.destroy(scope);
        }
    }
}

/// Thread-confined stage chain executing one task at a time
pub struct ProcessPipeline {
    scope: ThreadScope,
    stages: Vec<Box<dyn TaskProcessor>>,
    metrics: Arc<UnitMetrics>,
}

impl ProcessPipeline {
    /// Run one task through every stage in declaration order
    ///
    /// The accumulating context travels with the task. The first stage error
    /// stops the chain for this task; the outcome is recorded to metrics and
    /// returned, never propagated as a worker failure.
    pub fn process(&mut self, task: &TaskRequest) -> TaskOutcome {
        let start = Instant::now();
        let mut context = ProcessingContext::new(&self.scope, task);

        let mut outcome = TaskOutcome::Completed;
        for stage in &mut self.stages {
            match stage.process(&mut context, task) {
                Ok(()) => {}
                Err(StageError::Interrupted) => {
                    debug!(
                        "Pipeline {}: stage '{}' interrupted at {}",
                        self.scope,
                        stage.name(),
                        task.position()
                    );
                    outcome = TaskOutcome::Interrupted;
                    break;
                }
                Err(StageError::Failed(source)) => {
                    warn!(
                        "Pipeline {}: stage '{}' failed at {}: {}",
                        self.scope,
                        stage.name(),
                        task.position(),
                        source
                    );
                    outcome = TaskOutcome::Failed;
                    break;
                }
            }
        }

        self.metrics.record_latency(start.elapsed());
        match outcome {
            TaskOutcome::Completed => self.metrics.record_task_processed(),
            TaskOutcome::Failed => self.metrics.record_task_failed(),
            // Cooperative cancellation mid-task: the task was not delivered,
            // which the transport resolves through its offset discipline.
            TaskOutcome::Interrupted => self.metrics.record_tasks_discarded(1),
        }
        outcome
    }

    /// Close stage instances in reverse construction order
    pub fn close(&mut self) {
        while let Some(mut stage) = self.stages.pop() {
            debug!("Pipeline {}: closing stage '{}'", self.scope, stage.name());
            stage.close();
        }
    }
}
