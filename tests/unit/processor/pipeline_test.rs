//! Stage chain semantics observed through a live unit pool

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use keylane::{
    AsyncShutdown, PartitionProcessor, ProcessingContext, ProcessorConfig, StageError, StageSet,
    TaskProcessor, TaskRequest, ThreadScope,
};

use crate::unit::test_utils::{init_logger, keyed_task, scope_with, wait_until};

#[test]
fn test_factories_run_once_per_worker_on_worker_threads() {
    init_logger();
    let (_store, scope) = scope_with(ProcessorConfig {
        partition_concurrency: 3,
        ..Default::default()
    });

    // (subpartition, thread name) per factory invocation.
    let invocations: Arc<Mutex<Vec<(usize, String)>>> = Arc::new(Mutex::new(Vec::new()));

    struct NoopStage;
    impl TaskProcessor for NoopStage {
        fn process(
            &mut self,
            _context: &mut ProcessingContext,
            _task: &TaskRequest,
        ) -> Result<(), StageError> {
            Ok(())
        }
    }

    let stages = {
        let invocations = Arc::clone(&invocations);
        StageSet::new().stage(move |scope: &ThreadScope| -> Box<dyn TaskProcessor> {
            let on_thread = thread::current().name().unwrap_or("unnamed").to_string();
            invocations
                .lock()
                .unwrap()
                .push((scope.subpartition(), on_thread));
            Box::new(NoopStage)
        })
    };

    let mut processor = PartitionProcessor::new(scope, stages).unwrap();
    processor.shutdown();

    let invocations = invocations.lock().unwrap();
    assert_eq!(invocations.len(), 3, "expected one factory call per worker");

    let subpartitions: HashSet<usize> =
        invocations.iter().map(|(subpartition, _)| *subpartition).collect();
    assert_eq!(subpartitions, HashSet::from([0, 1, 2]));

    for (subpartition, thread_name) in invocations.iter() {
        assert!(
            thread_name.ends_with(&format!("-{}", subpartition)),
            "factory for unit {} ran on thread '{}'",
            subpartition,
            thread_name
        );
    }
}

#[test]
fn test_stage_failure_does_not_stop_the_worker() {
    init_logger();
    let (_store, scope) = scope_with(ProcessorConfig::default());

    struct FailSecondStage {
        processed: Arc<Mutex<Vec<i64>>>,
    }

    impl TaskProcessor for FailSecondStage {
        fn process(
            &mut self,
            _context: &mut ProcessingContext,
            task: &TaskRequest,
        ) -> Result<(), StageError> {
            if task.offset() == 2 {
                return Err(StageError::message("synthetic failure on task 2"));
            }
            self.processed.lock().unwrap().push(task.offset());
            Ok(())
        }

        fn name(&self) -> &str {
            "fail-second"
        }
    }

    let processed: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
    let stages = {
        let processed = Arc::clone(&processed);
        StageSet::new().stage(move |_scope: &ThreadScope| -> Box<dyn TaskProcessor> {
            Box::new(FailSecondStage {
                processed: Arc::clone(&processed),
            })
        })
    };

    let mut processor = PartitionProcessor::new(scope, stages).unwrap();
    // Five tasks on one key; task 2 fails in its stage.
    for offset in 1..=5 {
        processor.add_task(keyed_task("single", offset)).unwrap();
    }

    assert!(wait_until(Duration::from_secs(5), || {
        processed.lock().unwrap().len() == 4
    }));
    processor.shutdown();

    assert_eq!(*processed.lock().unwrap(), vec![1, 3, 4, 5]);

    let snapshots = processor.metrics_snapshots();
    assert_eq!(snapshots[0].tasks_processed, 4);
    assert_eq!(snapshots[0].tasks_failed, 1);
}

#[test]
fn test_context_attributes_flow_between_stages() {
    init_logger();
    let (_store, scope) = scope_with(ProcessorConfig::default());

    struct TaggingStage;
    impl TaskProcessor for TaggingStage {
        fn process(
            &mut self,
            context: &mut ProcessingContext,
            task: &TaskRequest,
        ) -> Result<(), StageError> {
            context.set_attribute("payload_len", task.payload().len().to_string());
            Ok(())
        }

        fn name(&self) -> &str {
            "tagging"
        }
    }

    struct AssertingStage {
        observed: Arc<Mutex<Vec<String>>>,
    }
    impl TaskProcessor for AssertingStage {
        fn process(
            &mut self,
            context: &mut ProcessingContext,
            _task: &TaskRequest,
        ) -> Result<(), StageError> {
            let value = context
                .attribute("payload_len")
                .ok_or_else(|| StageError::message("upstream attribute missing"))?
                .to_string();
            self.observed.lock().unwrap().push(value);
            Ok(())
        }

        fn name(&self) -> &str {
            "asserting"
        }
    }

    let observed: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let stages = {
        let observed = Arc::clone(&observed);
        StageSet::new()
            .stage(|_scope: &ThreadScope| -> Box<dyn TaskProcessor> { Box::new(TaggingStage) })
            .stage(move |_scope: &ThreadScope| -> Box<dyn TaskProcessor> {
                Box::new(AssertingStage {
                    observed: Arc::clone(&observed),
                })
            })
    };

    let mut processor = PartitionProcessor::new(scope, stages).unwrap();
    processor.add_task(keyed_task("k", 0)).unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        !observed.lock().unwrap().is_empty()
    }));
    processor.shutdown();

    // "payload-0" is nine bytes.
    assert_eq!(*observed.lock().unwrap(), vec!["9".to_string()]);

    let snapshots = processor.metrics_snapshots();
    assert_eq!(snapshots[0].tasks_failed, 0);
}
