//! Two-phase shutdown behavior across the unit pool

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use keylane::{
    AsyncShutdown, PartitionProcessor, ProcessingContext, ProcessorConfig, StageError, StageSet,
    TaskProcessor, TaskRequest, ThreadScope,
};

use crate::unit::test_utils::{
    init_logger, keyless_task, recording_stages, scope_with, wait_until,
};

/// Stage that marks when it starts a task, then holds it for a fixed time
struct SlowStage {
    started: Arc<AtomicU64>,
    completed: Arc<Mutex<Vec<usize>>>,
    hold: Duration,
}

impl TaskProcessor for SlowStage {
    fn process(
        &mut self,
        context: &mut ProcessingContext,
        _task: &TaskRequest,
    ) -> Result<(), StageError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.hold);
        self.completed.lock().unwrap().push(context.subpartition());
        Ok(())
    }

    fn name(&self) -> &str {
        "slow"
    }
}

#[test]
fn test_shutdown_time_tracks_slowest_unit_not_the_sum() {
    init_logger();
    let units = 4;
    let hold = Duration::from_millis(300);
    let (_store, scope) = scope_with(ProcessorConfig {
        partition_concurrency: units,
        ..Default::default()
    });

    let started = Arc::new(AtomicU64::new(0));
    let completed = Arc::new(Mutex::new(Vec::new()));
    let stages = {
        let started = Arc::clone(&started);
        let completed = Arc::clone(&completed);
        StageSet::new().stage(move |_scope: &ThreadScope| -> Box<dyn TaskProcessor> {
            Box::new(SlowStage {
                started: Arc::clone(&started),
                completed: Arc::clone(&completed),
                hold,
            })
        })
    };

    let mut processor = PartitionProcessor::new(scope, stages).unwrap();

    // Keyless tasks round-robin, so one in-flight task per unit.
    for offset in 0..units as i64 {
        processor.add_task(keyless_task(offset)).unwrap();
    }
    assert!(wait_until(Duration::from_secs(5), || {
        started.load(Ordering::SeqCst) == units as u64
    }));

    let shutdown_started = Instant::now();
    processor.initiate_shutdown();
    let initiate_cost = shutdown_started.elapsed();
    processor.await_shutdown();
    let total = shutdown_started.elapsed();

    // initiate must not block on the in-flight work.
    assert!(
        initiate_cost < Duration::from_millis(100),
        "initiate_shutdown blocked for {:?}",
        initiate_cost
    );
    // All four closes overlap: total ≈ one hold, far below four.
    assert!(
        total < hold * 2,
        "parallel shutdown of {} units took {:?} (hold {:?})",
        units,
        total,
        hold
    );
    // In-flight tasks were allowed to finish, one per unit.
    assert_eq!(completed.lock().unwrap().len(), units);
}

#[test]
fn test_in_flight_task_finishes_queued_tasks_drop() {
    init_logger();
    let (_store, scope) = scope_with(ProcessorConfig {
        partition_concurrency: 1,
        ..Default::default()
    });

    let started = Arc::new(AtomicU64::new(0));
    let completed = Arc::new(Mutex::new(Vec::new()));
    let stages = {
        let started = Arc::clone(&started);
        let completed = Arc::clone(&completed);
        StageSet::new().stage(move |_scope: &ThreadScope| -> Box<dyn TaskProcessor> {
            Box::new(SlowStage {
                started: Arc::clone(&started),
                completed: Arc::clone(&completed),
                hold: Duration::from_millis(200),
            })
        })
    };

    let mut processor = PartitionProcessor::new(scope, stages).unwrap();
    for offset in 0..5 {
        processor.add_task(keyless_task(offset)).unwrap();
    }
    // Let the single worker pick up the first task, then shut down.
    assert!(wait_until(Duration::from_secs(5), || {
        started.load(Ordering::SeqCst) >= 1
    }));
    processor.shutdown();

    // The in-flight task completed; the rest were discarded unprocessed.
    let completed_count = completed.lock().unwrap().len() as u64;
    assert_eq!(completed_count, started.load(Ordering::SeqCst));
    let snapshot = &processor.metrics_snapshots()[0];
    assert_eq!(
        snapshot.tasks_processed + snapshot.tasks_discarded,
        5,
        "every submitted task must be either processed or discarded"
    );
    assert!(snapshot.tasks_discarded >= 1, "no queued task was dropped");
}

#[test]
fn test_shutdown_is_idempotent() {
    init_logger();
    let (_store, scope) = scope_with(ProcessorConfig {
        partition_concurrency: 2,
        ..Default::default()
    });
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut processor = PartitionProcessor::new(scope, recording_stages(&log)).unwrap();

    processor.initiate_shutdown();
    processor.initiate_shutdown();
    processor.await_shutdown();
    processor.await_shutdown();
}

#[test]
fn test_worker_panic_is_contained() {
    init_logger();
    let (_store, scope) = scope_with(ProcessorConfig {
        partition_concurrency: 2,
        ..Default::default()
    });

    struct PanickingStage;
    impl TaskProcessor for PanickingStage {
        fn process(
            &mut self,
            _context: &mut ProcessingContext,
            task: &TaskRequest,
        ) -> Result<(), StageError> {
            if task.offset() == 0 {
                panic!("stage blew up");
            }
            Ok(())
        }
    }

    let stages = StageSet::new()
        .stage(|_scope: &ThreadScope| -> Box<dyn TaskProcessor> { Box::new(PanickingStage) });
    let mut processor = PartitionProcessor::new(scope, stages).unwrap();

    processor.add_task(keyless_task(0)).unwrap();
    processor.add_task(keyless_task(1)).unwrap();
    thread::sleep(Duration::from_millis(100));

    // One worker died mid-task; shutdown still completes for the pool.
    processor.shutdown();
}
