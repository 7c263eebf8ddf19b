//! Shared helpers for the unit suite

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use keylane::{
    ConfigStore, PartitionScope, ProcessingContext, ProcessorConfig, StageError, StageSet,
    TaskProcessor, TaskRequest, ThreadScope, TopicPartition,
};

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Partition scope over a fresh config store with the given settings
pub(crate) fn scope_with(config: ProcessorConfig) -> (ConfigStore, PartitionScope) {
    let store = ConfigStore::new(config).expect("test config must validate");
    let scope = PartitionScope::new("test-sub", TopicPartition::new("events", 0), store.handle());
    (store, scope)
}

pub(crate) fn keyed_task(key: &str, offset: i64) -> TaskRequest {
    TaskRequest::new(
        TopicPartition::new("events", 0),
        offset,
        Some(key.as_bytes().to_vec()),
        format!("payload-{}", offset).into_bytes(),
    )
}

pub(crate) fn keyless_task(offset: i64) -> TaskRequest {
    TaskRequest::new(TopicPartition::new("events", 0), offset, None, Vec::new())
}

/// What a recording stage saw for one task
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ProcessedEvent {
    pub key: Option<String>,
    pub offset: i64,
    pub subpartition: usize,
}

/// Stage that records every task it processes, in processing order
pub(crate) struct RecordingStage {
    log: Arc<Mutex<Vec<ProcessedEvent>>>,
}

impl TaskProcessor for RecordingStage {
    fn process(
        &mut self,
        context: &mut ProcessingContext,
        task: &TaskRequest,
    ) -> Result<(), StageError> {
        self.log.lock().unwrap().push(ProcessedEvent {
            key: task
                .key()
                .map(|key| String::from_utf8_lossy(key).into_owned()),
            offset: task.offset(),
            subpartition: context.subpartition(),
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Single-stage set that appends to the given event log
pub(crate) fn recording_stages(log: &Arc<Mutex<Vec<ProcessedEvent>>>) -> StageSet {
    let log = Arc::clone(log);
    StageSet::new().stage(move |_scope: &ThreadScope| -> Box<dyn TaskProcessor> {
        Box::new(RecordingStage {
            log: Arc::clone(&log),
        })
    })
}

/// Poll until the condition holds; false if the deadline passes first
pub(crate) fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let limit = Instant::now() + deadline;
    while !condition() {
        if Instant::now() >= limit {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    true
}
