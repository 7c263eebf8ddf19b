//! One worker unit: dedicated thread, bounded queue, scheduler, pipeline
//!
//! A `ProcessorUnit` owns exactly one sub-partition. Its single consumer
//! thread is what turns queue FIFO order into the per-key processing-order
//! guarantee: every task routed here is executed strictly in arrival order,
//! one at a time. The feeding side enqueues through `put_task`, which never
//! blocks — the queue bound is enforced upstream by the transport's fetch
//! throttling, so a saturated queue fails fast instead of stalling the
//! partition's feeding thread.
//!
//! ## Worker loop
//!
//! dequeue → scheduler gate (rate limiting / cancellation) → pipeline.
//! An idle worker spins briefly, then parks; `put_task` unparks it. Most
//! tasks arrive within microseconds of each other under load, so the short
//! spin catches the common case without a syscall.

use crossbeam_queue::ArrayQueue;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use crate::keylane::processor::error::ProcessorError;
use crate::keylane::processor::metrics::{UnitMetrics, UnitMetricsSnapshot};
use crate::keylane::processor::pipeline::StageSet;
use crate::keylane::processor::rate_limiter::RateLimiter;
use crate::keylane::processor::scheduler::{ExecutionScheduler, SchedulingOutcome};
use crate::keylane::processor::scope::ThreadScope;
use crate::keylane::processor::shutdown::AsyncShutdown;
use crate::keylane::processor::task::TaskRequest;

/// Spin window before an idle worker parks
const IDLE_SPIN: Duration = Duration::from_micros(100);

/// Park interval; bounds shutdown-notice latency for an idle worker
const IDLE_PARK: Duration = Duration::from_millis(1);

/// Lifecycle of a worker unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UnitState {
    /// Constructed, worker still materializing its pipeline
    Idle = 0,
    /// Accepting and processing tasks
    Running = 1,
    /// Shutdown initiated; draining and refusing new tasks
    Closing = 2,
    /// Worker thread joined
    Closed = 3,
}

impl UnitState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => UnitState::Idle,
            1 => UnitState::Running,
            2 => UnitState::Closing,
            _ => UnitState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitState::Idle => "idle",
            UnitState::Running => "running",
            UnitState::Closing => "closing",
            UnitState::Closed => "closed",
        }
    }
}

/// One ordered worker: thread + bounded queue + scheduler + pipeline
pub struct ProcessorUnit {
    scope: ThreadScope,
    queue: Arc<ArrayQueue<TaskRequest>>,
    capacity: usize,
    shutdown: Arc<AtomicBool>,
    scheduler: Arc<ExecutionScheduler>,
    metrics: Arc<UnitMetrics>,
    state: Arc<AtomicU8>,
    worker: Option<thread::JoinHandle<()>>,
}

impl ProcessorUnit {
    /// Spawn the unit's worker thread and wait until its pipeline is ready
    ///
    /// Stage factories run on the worker thread itself, so stages never
    /// cross threads. If any factory fails, the thread exits and the error
    /// propagates to the caller with no running unit left behind.
    pub fn start(
        scope: ThreadScope,
        stages: StageSet,
        limiter: Arc<dyn RateLimiter>,
        capacity: usize,
    ) -> Result<Self, ProcessorError> {
        let metrics = Arc::new(UnitMetrics::new(scope.subpartition()));
        let scheduler = Arc::new(ExecutionScheduler::new(
            scope.clone(),
            limiter,
            Arc::clone(&metrics),
        ));
        let queue = Arc::new(ArrayQueue::new(capacity));
        let shutdown = Arc::new(AtomicBool::new(false));
        let state = Arc::new(AtomicU8::new(UnitState::Idle as u8));
        let (ready_tx, ready_rx) = mpsc::channel();

        let worker = {
            let worker_scope = scope.clone();
            let queue = Arc::clone(&queue);
            let shutdown = Arc::clone(&shutdown);
            let scheduler = Arc::clone(&scheduler);
            let metrics = Arc::clone(&metrics);
            let state = Arc::clone(&state);
            thread::Builder::new()
                .name(scope.thread_name())
                .spawn(move || {
                    worker_loop(
                        worker_scope,
                        stages,
                        queue,
                        shutdown,
                        scheduler,
                        metrics,
                        state,
                        ready_tx,
                    )
                })
                .map_err(|source| ProcessorError::WorkerStartFailed {
                    scope: scope.to_string(),
                    source: Box::new(source),
                })?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                scope,
                queue,
                capacity,
                shutdown,
                scheduler,
                metrics,
                state,
                worker: Some(worker),
            }),
            Ok(Err(startup_error)) => {
                // The thread exits right after reporting; reap it.
                let _ = worker.join();
                Err(startup_error)
            }
            Err(_) => {
                let _ = worker.join();
                Err(ProcessorError::WorkerStartFailed {
                    scope: scope.to_string(),
                    source: "worker thread died during startup".into(),
                })
            }
        }
    }

    /// Enqueue one task without blocking
    ///
    /// Fails fast with `QueueFull` when the bounded queue is saturated and
    /// with `UnitNotRunning` once shutdown began. Callers are expected to
    /// have bounded total outstanding tasks already.
    pub fn put_task(&self, task: TaskRequest) -> Result<(), ProcessorError> {
        let state = self.state();
        if state != UnitState::Running {
            return Err(ProcessorError::UnitNotRunning {
                scope: self.scope.to_string(),
                state: state.as_str(),
            });
        }

        self.queue
            .push(task)
            .map_err(|_rejected| ProcessorError::QueueFull {
                scope: self.scope.to_string(),
                capacity: self.capacity,
            })?;
        self.metrics.update_queue_depth(self.queue.len());

        if let Some(worker) = &self.worker {
            worker.thread().unpark();
        }
        Ok(())
    }

    pub fn scope(&self) -> &ThreadScope {
        &self.scope
    }

    pub fn state(&self) -> UnitState {
        UnitState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Tasks queued but not yet started
    pub fn pending_tasks(&self) -> usize {
        self.queue.len()
    }

    /// Pending-queue capacity this unit was built with
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Backpressure classification from current queue utilization
    pub fn backpressure_state(&self) -> crate::keylane::processor::metrics::BackpressureState {
        self.metrics.backpressure_state(self.capacity)
    }

    pub fn metrics(&self) -> Arc<UnitMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn metrics_snapshot(&self) -> UnitMetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl AsyncShutdown for ProcessorUnit {
    fn initiate_shutdown(&mut self) {
        let state = self.state();
        if state == UnitState::Closing || state == UnitState::Closed {
            return;
        }
        debug!("Unit {}: shutdown initiated", self.scope);
        self.state
            .store(UnitState::Closing as u8, Ordering::Release);
        self.shutdown.store(true, Ordering::Release);
        self.scheduler.terminate();
        if let Some(worker) = &self.worker {
            worker.thread().unpark();
        }
    }

    fn await_shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                // A stage panic already killed the loop; shutdown of the
                // remaining units must still proceed.
                error!("Unit {}: worker thread panicked", self.scope);
            }
        }
        self.state.store(UnitState::Closed as u8, Ordering::Release);
        info!(
            "Unit {}: shutdown complete. {}",
            self.scope,
            self.metrics.snapshot().format_summary()
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    scope: ThreadScope,
    stages: StageSet,
    queue: Arc<ArrayQueue<TaskRequest>>,
    shutdown: Arc<AtomicBool>,
    scheduler: Arc<ExecutionScheduler>,
    metrics: Arc<UnitMetrics>,
    state: Arc<AtomicU8>,
    ready_tx: mpsc::Sender<Result<(), ProcessorError>>,
) {
    // Stage instances are built here, on the thread that will own them.
    let mut pipeline = match stages.build_pipeline(&scope, Arc::clone(&metrics)) {
        Ok(pipeline) => {
            state.store(UnitState::Running as u8, Ordering::Release);
            let _ = ready_tx.send(Ok(()));
            pipeline
        }
        Err(startup_error) => {
            let _ = ready_tx.send(Err(startup_error));
            return;
        }
    };
    debug!("Unit {}: worker started", scope);

    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }

        match queue.pop() {
            Some(task) => {
                metrics.update_queue_depth(queue.len());
                match scheduler.wait_for_permission() {
                    SchedulingOutcome::Proceed => {
                        pipeline.process(&task);
                    }
                    SchedulingOutcome::Cancelled => {
                        // Shutdown landed while waiting for admission; the
                        // dequeued task is dropped, not processed.
                        metrics.record_tasks_discarded(1);
                        break;
                    }
                }
            }
            None => idle_wait(&queue, &shutdown),
        }
    }

    // Drain without processing. Undelivered tasks stay the transport's
    // responsibility through its un-committed offsets.
    let mut discarded = 0u64;
    while queue.pop().is_some() {
        discarded += 1;
    }
    if discarded > 0 {
        warn!(
            "Unit {}: discarded {} queued task(s) at shutdown",
            scope, discarded
        );
        metrics.record_tasks_discarded(discarded);
    }
    metrics.update_queue_depth(0);

    pipeline.close();
    stages.destroy_scope(&scope);
    debug!("Unit {}: worker exiting", scope);
}

/// Spin briefly, then park until unparked or the interval elapses
fn idle_wait(queue: &ArrayQueue<TaskRequest>, shutdown: &AtomicBool) {
    let wait_start = Instant::now();
    loop {
        if shutdown.load(Ordering::Acquire) || !queue.is_empty() {
            return;
        }
        if wait_start.elapsed() < IDLE_SPIN {
            std::hint::spin_loop();
        } else {
            thread::park_timeout(IDLE_PARK);
            return;
        }
    }
}
