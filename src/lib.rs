//! # keylane
//!
//! Per-key ordered, rate-limited, parallel task processing for partitioned
//! event streams. The engine sits between a log transport's poll loop and
//! user-supplied processing stages, fanning each partition's records out
//! across a pool of dedicated worker threads while keeping every ordering
//! key on a single, strictly FIFO lane.
//!
//! ## Features
//!
//! - **Per-Key Ordering**: tasks sharing a key are processed in submission
//!   order even with many workers per partition
//! - **Sub-Partition Parallelism**: processing concurrency beyond the
//!   partition count of the underlying log
//! - **Adaptive Admission Control**: a shared, live-reconfigurable rate
//!   limiter bounds aggregate partition throughput
//! - **Thread-Confined Stages**: stage factories run once per worker, so
//!   stages may hold non-shareable native or stateful resources
//! - **Two-Phase Shutdown**: fan out `initiate_shutdown` across many
//!   partitions, then block once — total latency tracks the slowest worker,
//!   not the sum
//!
//! ## Quick Start
//!
//! ```rust
//! use keylane::{
//!     AsyncShutdown, ConfigStore, PartitionProcessor, PartitionScope, ProcessingContext,
//!     ProcessorConfig, StageError, StageSet, TaskProcessor, TaskRequest, ThreadScope,
//!     TopicPartition,
//! };
//!
//! struct PrintStage;
//!
//! impl TaskProcessor for PrintStage {
//!     fn process(
//!         &mut self,
//!         context: &mut ProcessingContext,
//!         task: &TaskRequest,
//!     ) -> Result<(), StageError> {
//!         println!("{}@{}: {} bytes", context.topic_partition(), context.offset(),
//!                  task.payload().len());
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = ConfigStore::new(ProcessorConfig {
//!         partition_concurrency: 4,
//!         ..Default::default()
//!     })?;
//!
//!     let stages = StageSet::new()
//!         .stage(|_scope: &ThreadScope| -> Box<dyn TaskProcessor> { Box::new(PrintStage) });
//!
//!     let scope = PartitionScope::new("example", TopicPartition::new("orders", 0), store.handle());
//!     let mut processor = PartitionProcessor::new(scope, stages)?;
//!
//!     // The transport's poll loop hands records over as TaskRequests.
//!     processor.add_task(TaskRequest::new(
//!         TopicPartition::new("orders", 0),
//!         0,
//!         Some(b"user-1".to_vec()),
//!         b"{}".to_vec(),
//!     ))?;
//!
//!     processor.initiate_shutdown();
//!     processor.await_shutdown();
//!     Ok(())
//! }
//! ```
//!
//! The transport loop itself (polling, offset commits, redelivery) is an
//! external collaborator: this crate consumes `TaskRequest`s and exposes
//! pending-task counts and backpressure states for the transport's fetch
//! throttling.

pub mod keylane;

pub use crate::keylane::config::{
    ConfigError, ConfigHandle, ConfigStore, ProcessorConfig, RATE_PAUSED, RATE_UNLIMITED,
};
pub use crate::keylane::harness::{
    GeneratorConfig, LoadConfig, LoadReport, LoadRunner, TaskGenerator, TaskStats,
};
pub use crate::keylane::processor::{
    AcquireOutcome, AsyncShutdown, BackpressureState, DynamicRateLimiter, ExecutionScheduler,
    PartitionProcessor, PartitionScope, ProcessingContext, ProcessorError, ProcessorUnit,
    RateLimiter, SchedulingOutcome, StageError, StageFactory, StageSet, SubPartitioner,
    TaskOutcome, TaskProcessor, TaskRequest, ThreadScope, TopicPartition, UnitMetrics,
    UnitMetricsSnapshot, UnitState,
};
