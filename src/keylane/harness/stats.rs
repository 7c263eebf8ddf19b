//! Task completion statistics for load runs
//!
//! Recorded from worker threads via a measuring stage, read by the run
//! driver. Latency is measured from the task's record timestamp (stamped at
//! generation time) to completion, i.e. delivery latency through the queue,
//! the admission gate, and the pipeline.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Thread-safe completion counters for one load run
#[derive(Debug, Default)]
pub struct TaskStats {
    completed: AtomicU64,
    failed: AtomicU64,
    total_latency_micros: AtomicU64,
    max_latency_micros: AtomicU64,
}

impl TaskStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed task and its delivery latency
    pub fn record_completed(&self, latency: Duration) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        let micros = latency.as_micros() as u64;
        self.total_latency_micros
            .fetch_add(micros, Ordering::Relaxed);
        self.max_latency_micros.fetch_max(micros, Ordering::Relaxed);
    }

    /// Record one task whose stage reported failure
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Completed + failed; the run driver polls this for drain progress
    pub fn total(&self) -> u64 {
        self.completed() + self.failed()
    }

    /// Clear all counters (between warmup and measurement)
    pub fn reset(&self) {
        self.completed.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.total_latency_micros.store(0, Ordering::Relaxed);
        self.max_latency_micros.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TaskStatsSnapshot {
        let completed = self.completed();
        let total_latency = self.total_latency_micros.load(Ordering::Relaxed);
        TaskStatsSnapshot {
            completed,
            failed: self.failed(),
            avg_latency_micros: if completed == 0 {
                0
            } else {
                total_latency / completed
            },
            max_latency_micros: self.max_latency_micros.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of a run's statistics
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatsSnapshot {
    pub completed: u64,
    pub failed: u64,
    pub avg_latency_micros: u64,
    pub max_latency_micros: u64,
}
