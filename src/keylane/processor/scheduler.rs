//! Per-worker execution gate applying the shared rate limiter
//!
//! One `ExecutionScheduler` exists per worker unit. It is the sole
//! suspension point on the worker thread outside of task processing itself:
//! before each task is released to the pipeline the worker blocks here until
//! the partition's shared rate limiter grants admission, or until shutdown
//! cancels the wait.

use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::keylane::processor::metrics::UnitMetrics;
use crate::keylane::processor::rate_limiter::{AcquireOutcome, RateLimiter};
use crate::keylane::processor::scope::ThreadScope;

/// Outcome of one scheduling gate pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingOutcome {
    /// Admission granted; the task may run
    Proceed,
    /// The unit is shutting down; drop the pending task and exit the loop
    Cancelled,
}

/// Gate between a unit's queue and its pipeline
pub struct ExecutionScheduler {
    scope: ThreadScope,
    limiter: Arc<dyn RateLimiter>,
    metrics: Arc<UnitMetrics>,
    terminated: AtomicBool,
}

impl ExecutionScheduler {
    pub fn new(
        scope: ThreadScope,
        limiter: Arc<dyn RateLimiter>,
        metrics: Arc<UnitMetrics>,
    ) -> Self {
        Self {
            scope,
            limiter,
            metrics,
            terminated: AtomicBool::new(false),
        }
    }

    /// Block until the next task may proceed
    ///
    /// Returns `Cancelled` when the unit was terminated before or during the
    /// wait, or when the shared limiter was closed by partition shutdown.
    /// Cancellation is cooperative, not an error.
    pub fn wait_for_permission(&self) -> SchedulingOutcome {
        if self.terminated.load(Ordering::Acquire) {
            return SchedulingOutcome::Cancelled;
        }

        match self.limiter.acquire() {
            AcquireOutcome::Admitted(waited) => {
                if !waited.is_zero() {
                    self.metrics.record_throttle_wait(waited);
                }
                // A terminate may have landed while we were parked in the
                // limiter; honor it rather than starting another task.
                if self.terminated.load(Ordering::Acquire) {
                    SchedulingOutcome::Cancelled
                } else {
                    SchedulingOutcome::Proceed
                }
            }
            AcquireOutcome::Closed => SchedulingOutcome::Cancelled,
        }
    }

    /// Cancel any current and future waits; called once at unit shutdown
    pub fn terminate(&self) {
        debug!("Scheduler {}: terminated", self.scope);
        self.terminated.store(true, Ordering::Release);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}
