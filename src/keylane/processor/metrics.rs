//! Per-unit metrics for monitoring and backpressure detection
//!
//! Tracks task throughput, queue depth, processing latency, and throttle
//! wait time for each worker unit to enable:
//! - Real-time performance monitoring
//! - Backpressure signal generation toward the feeding side
//! - Hot sub-partition detection
//!
//! Metrics/reporting backends are external collaborators; this layer only
//! accumulates counters and hands out immutable snapshots.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Per-unit performance counters (thread-safe)
///
/// Written by the unit's worker thread and the feeding thread, read by
/// whoever polls snapshots. All counters are relaxed atomics; exactness
/// across concurrent reads is not required.
#[derive(Debug)]
pub struct UnitMetrics {
    subpartition: usize,

    // Task accounting
    tasks_processed: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_discarded: AtomicU64,

    // Queue backpressure detection
    queue_depth: AtomicUsize,

    // Latency tracking (microseconds)
    total_latency_micros: AtomicU64,
    latency_sample_count: AtomicU64,

    // Time spent blocked on rate-limiter admission (microseconds)
    throttle_wait_micros: AtomicU64,

    // Throughput window
    last_snapshot_time: std::sync::Mutex<Instant>,
    last_snapshot_count: AtomicU64,
}

impl UnitMetrics {
    pub fn new(subpartition: usize) -> Self {
        Self {
            subpartition,
            tasks_processed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            tasks_discarded: AtomicU64::new(0),
            queue_depth: AtomicUsize::new(0),
            total_latency_micros: AtomicU64::new(0),
            latency_sample_count: AtomicU64::new(0),
            throttle_wait_micros: AtomicU64::new(0),
            last_snapshot_time: std::sync::Mutex::new(Instant::now()),
            last_snapshot_count: AtomicU64::new(0),
        }
    }

    pub fn subpartition(&self) -> usize {
        self.subpartition
    }

    /// Record one successfully processed task
    pub fn record_task_processed(&self) {
        self.tasks_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one task whose stage chain reported failure
    pub fn record_task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record tasks dropped unprocessed during shutdown
    pub fn record_tasks_discarded(&self, count: u64) {
        self.tasks_discarded.fetch_add(count, Ordering::Relaxed);
    }

    /// Update current pending-queue depth
    pub fn update_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    /// Record end-to-end pipeline latency for one task
    pub fn record_latency(&self, latency: Duration) {
        let micros = latency.as_micros() as u64;
        self.total_latency_micros
            .fetch_add(micros, Ordering::Relaxed);
        self.latency_sample_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record time spent waiting for rate-limiter admission
    pub fn record_throttle_wait(&self, wait: Duration) {
        self.throttle_wait_micros
            .fetch_add(wait.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    pub fn total_tasks_processed(&self) -> u64 {
        self.tasks_processed.load(Ordering::Relaxed)
    }

    pub fn total_tasks_failed(&self) -> u64 {
        self.tasks_failed.load(Ordering::Relaxed)
    }

    pub fn total_tasks_discarded(&self) -> u64 {
        self.tasks_discarded.load(Ordering::Relaxed)
    }

    pub fn total_throttle_wait(&self) -> Duration {
        Duration::from_micros(self.throttle_wait_micros.load(Ordering::Relaxed))
    }

    /// Average pipeline latency in microseconds
    pub fn avg_latency_micros(&self) -> u64 {
        let total = self.total_latency_micros.load(Ordering::Relaxed);
        let count = self.latency_sample_count.load(Ordering::Relaxed);

        if count == 0 {
            return 0;
        }

        total / count
    }

    /// Throughput since the previous call (tasks per second)
    pub fn throughput_per_sec(&self) -> u64 {
        let mut last_time = self.last_snapshot_time.lock().unwrap();
        let elapsed = last_time.elapsed();

        if elapsed.as_secs() == 0 {
            return 0;
        }

        let current = self.tasks_processed.load(Ordering::Relaxed);
        let last = self.last_snapshot_count.load(Ordering::Relaxed);
        let delta = current.saturating_sub(last);

        *last_time = Instant::now();
        self.last_snapshot_count.store(current, Ordering::Relaxed);

        delta / elapsed.as_secs()
    }

    /// Fraction of the pending queue in use (0.0 - 1.0)
    pub fn queue_utilization(&self, capacity: usize) -> f64 {
        if capacity == 0 {
            return 0.0;
        }
        (self.queue_depth() as f64 / capacity as f64).min(1.0)
    }

    /// Classify unit health from queue utilization
    pub fn backpressure_state(&self, capacity: usize) -> BackpressureState {
        let utilization = self.queue_utilization(capacity);

        match utilization {
            u if u < 0.7 => BackpressureState::Healthy,
            u if u < 0.9 => BackpressureState::Warning {
                utilization: u,
                subpartition: self.subpartition,
            },
            _ => BackpressureState::Saturated {
                subpartition: self.subpartition,
            },
        }
    }

    /// Immutable snapshot for logging/monitoring
    pub fn snapshot(&self) -> UnitMetricsSnapshot {
        UnitMetricsSnapshot {
            subpartition: self.subpartition,
            tasks_processed: self.total_tasks_processed(),
            tasks_failed: self.total_tasks_failed(),
            tasks_discarded: self.total_tasks_discarded(),
            queue_depth: self.queue_depth(),
            avg_latency_micros: self.avg_latency_micros(),
            throttle_wait_micros: self.throttle_wait_micros.load(Ordering::Relaxed),
        }
    }
}

/// Immutable snapshot of one unit's metrics
#[derive(Debug, Clone)]
pub struct UnitMetricsSnapshot {
    pub subpartition: usize,
    pub tasks_processed: u64,
    pub tasks_failed: u64,
    pub tasks_discarded: u64,
    pub queue_depth: usize,
    pub avg_latency_micros: u64,
    pub throttle_wait_micros: u64,
}

impl UnitMetricsSnapshot {
    /// Format metrics for human-readable logging
    pub fn format_summary(&self) -> String {
        format!(
            "Unit {}: {} processed, {} failed, {} discarded, queue depth: {}, avg latency: {}µs, throttled: {}µs",
            self.subpartition,
            self.tasks_processed,
            self.tasks_failed,
            self.tasks_discarded,
            self.queue_depth,
            self.avg_latency_micros,
            self.throttle_wait_micros
        )
    }
}

/// Backpressure classification for the feeding side
///
/// The transport's poll loop throttles fetching on aggregate pending count;
/// this gives it a coarser per-unit health signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackpressureState {
    /// Normal operation (<70% queue utilization)
    Healthy,

    /// Approaching capacity (70-90% utilization)
    Warning {
        utilization: f64,
        subpartition: usize,
    },

    /// Queue effectively full; `put_task` is about to fail fast
    Saturated { subpartition: usize },
}

impl BackpressureState {
    pub fn requires_throttling(&self) -> bool {
        !matches!(self, BackpressureState::Healthy)
    }
}
