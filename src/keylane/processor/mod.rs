//! Per-partition concurrency engine
//!
//! Everything between the transport's poll loop and the user's processing
//! stages: key-based routing to ordered sub-partition workers, shared
//! admission control, the per-task execution pipeline, and two-phase
//! shutdown across the worker pool.
//!
//! ## Data flow
//!
//! transport → [`PartitionProcessor::add_task`] → [`SubPartitioner`] →
//! [`ProcessorUnit`] queue → [`ExecutionScheduler`] → [`ProcessPipeline`] →
//! user stage chain.

pub mod error;
pub mod metrics;
pub mod partition_processor;
pub mod pipeline;
pub mod rate_limiter;
pub mod scheduler;
pub mod scope;
pub mod shutdown;
pub mod stage;
pub mod sub_partitioner;
pub mod task;
pub mod unit;

pub use error::ProcessorError;
pub use metrics::{BackpressureState, UnitMetrics, UnitMetricsSnapshot};
pub use partition_processor::PartitionProcessor;
pub use pipeline::{ProcessPipeline, StageSet, TaskOutcome};
pub use rate_limiter::{
    create_rate_limiter, AcquireOutcome, AverageRateLimiter, DynamicRateLimiter,
    PausedRateLimiter, RateLimiter, UnlimitedRateLimiter,
};
pub use scheduler::{ExecutionScheduler, SchedulingOutcome};
pub use scope::{PartitionScope, ThreadScope};
pub use shutdown::AsyncShutdown;
pub use stage::{ProcessingContext, StageError, StageFactory, TaskProcessor};
pub use sub_partitioner::SubPartitioner;
pub use task::{TaskRequest, TopicPartition};
pub use unit::{ProcessorUnit, UnitState};
