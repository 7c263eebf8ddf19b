//! Per-partition engine: key fan-out across an ordered pool of worker units
//!
//! A `PartitionProcessor` is created when a partition is assigned and torn
//! down when it is revoked or when the concurrency property changes (the
//! owner pauses feeding, shuts this processor down, and builds a new one
//! with the new unit count). It owns:
//! - the ordered list of `ProcessorUnit`s (one sub-partition each),
//! - the `SubPartitioner` sized to match,
//! - the shared `DynamicRateLimiter` bounding the partition's aggregate
//!   throughput (shared deliberately: per-unit fairness is traded for
//!   control of total partition load).
//!
//! ## Feeding contract
//!
//! `add_task` must be called by a single feeding thread at a time. The
//! router and unit list are immutable after construction, so that call path
//! needs no internal synchronization.

use log::{debug, info, warn};
use std::sync::Arc;

use crate::keylane::processor::error::ProcessorError;
use crate::keylane::processor::metrics::{BackpressureState, UnitMetricsSnapshot};
use crate::keylane::processor::pipeline::StageSet;
use crate::keylane::processor::rate_limiter::{DynamicRateLimiter, RateLimiter};
use crate::keylane::processor::scope::{PartitionScope, ThreadScope};
use crate::keylane::processor::shutdown::AsyncShutdown;
use crate::keylane::processor::sub_partitioner::SubPartitioner;
use crate::keylane::processor::task::TaskRequest;
use crate::keylane::processor::unit::ProcessorUnit;

/// Owns partially-constructed units until construction commits
///
/// If the k-th unit fails to start, dropping this guard tears down units
/// [0, k) — initiations fanned out first, the shared limiter closed, then
/// each unit joined — before the constructor's error propagates. No
/// partially-initialized pool is ever reachable.
struct PoolGuard {
    units: Vec<ProcessorUnit>,
    limiter: Arc<dyn RateLimiter>,
    armed: bool,
}

impl PoolGuard {
    fn new(limiter: Arc<dyn RateLimiter>, capacity: usize) -> Self {
        Self {
            units: Vec::with_capacity(capacity),
            limiter,
            armed: true,
        }
    }

    fn commit(mut self) -> Vec<ProcessorUnit> {
        self.armed = false;
        std::mem::take(&mut self.units)
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(
            "PartitionProcessor: rolling back {} partially-constructed unit(s)",
            self.units.len()
        );
        for unit in &mut self.units {
            unit.initiate_shutdown();
        }
        self.limiter.close();
        for unit in &mut self.units {
            unit.await_shutdown();
        }
    }
}

/// The per-partition processing engine
pub struct PartitionProcessor {
    scope: Arc<PartitionScope>,
    units: Vec<ProcessorUnit>,
    sub_partitioner: SubPartitioner,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl PartitionProcessor {
    /// Build the unit pool from the current configuration snapshot
    ///
    /// Reads concurrency once — later concurrency changes require a
    /// rebuild — and wires every unit to the shared dynamic rate limiter,
    /// which keeps following the live rate value on its own.
    pub fn new(scope: PartitionScope, stages: StageSet) -> Result<Self, ProcessorError> {
        let scope = Arc::new(scope);
        let config = scope.config().current();
        let concurrency = config.partition_concurrency;

        info!(
            "PartitionProcessor {}: starting {} unit(s), rate {}, queue capacity {}",
            scope, concurrency, config.processing_rate, config.max_pending_tasks
        );

        let sub_partitioner = SubPartitioner::new(concurrency);
        let rate_limiter: Arc<dyn RateLimiter> =
            Arc::new(DynamicRateLimiter::new(scope.config().clone()));

        let mut pool = PoolGuard::new(Arc::clone(&rate_limiter), concurrency);
        for subpartition in 0..concurrency {
            let unit = ProcessorUnit::start(
                ThreadScope::new(Arc::clone(&scope), subpartition),
                stages.clone(),
                Arc::clone(&rate_limiter),
                config.max_pending_tasks,
            )?;
            pool.units.push(unit);
        }

        Ok(Self {
            scope,
            units: pool.commit(),
            sub_partitioner,
            rate_limiter,
        })
    }

    /// Route one task to its ordered worker unit
    ///
    /// Tasks sharing a non-absent key always land on the same unit and are
    /// processed in submission order; keyless tasks are spread round-robin.
    /// Single feeding thread only.
    pub fn add_task(&self, request: TaskRequest) -> Result<(), ProcessorError> {
        let subpartition = self.sub_partitioner.partition_for(request.key());
        self.units[subpartition].put_task(request)
    }

    pub fn scope(&self) -> &PartitionScope {
        &self.scope
    }

    /// Number of worker units (fixed for this processor's lifetime)
    pub fn concurrency(&self) -> usize {
        self.units.len()
    }

    /// True when the live concurrency value no longer matches this pool
    ///
    /// Concurrency cannot change in place: the owner pauses feeding, shuts
    /// this processor down, and builds a replacement that reads the new
    /// snapshot. This is the signal to do so.
    pub fn concurrency_outdated(&self) -> bool {
        self.scope.config().current().partition_concurrency != self.units.len()
    }

    /// Aggregate queued-but-unstarted task count across all units
    ///
    /// The transport's poll loop throttles fetching on this value.
    pub fn pending_tasks(&self) -> usize {
        self.units.iter().map(ProcessorUnit::pending_tasks).sum()
    }

    /// Per-unit metrics snapshots for the observability collaborator
    pub fn metrics_snapshots(&self) -> Vec<UnitMetricsSnapshot> {
        self.units.iter().map(ProcessorUnit::metrics_snapshot).collect()
    }

    /// Per-unit backpressure classification for the feeding side
    pub fn backpressure_states(&self) -> Vec<BackpressureState> {
        self.units.iter().map(ProcessorUnit::backpressure_state).collect()
    }
}

impl AsyncShutdown for PartitionProcessor {
    fn initiate_shutdown(&mut self) {
        debug!("PartitionProcessor {}: initiating shutdown", self.scope);
        for unit in &mut self.units {
            unit.initiate_shutdown();
        }
        // Releases every worker parked in an admission wait. Nothing left
        // to fail here is allowed to stop the units from closing.
        self.rate_limiter.close();
    }

    fn await_shutdown(&mut self) {
        // Unit closes run on their own worker threads; joining one by one
        // still completes in roughly the slowest unit's close time.
        for unit in &mut self.units {
            unit.await_shutdown();
        }
        info!(
            "PartitionProcessor {}: shutdown complete ({} unit(s))",
            self.scope,
            self.units.len()
        );
    }
}
