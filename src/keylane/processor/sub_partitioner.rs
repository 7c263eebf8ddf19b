//! Key-based routing of tasks to worker units
//!
//! Maps a task's ordering key to one of N sub-partitions so that all tasks
//! sharing a key land on the same worker, which is what preserves per-key
//! ordering while N workers run concurrently. Keyless tasks have no ordering
//! requirement and are spread round-robin to balance load instead of being
//! pinned to a single worker.

use rustc_hash::FxHasher;
use std::hash::Hasher;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Deterministic key → worker-index router for one partition
///
/// Immutable after construction. Resizing the unit pool requires building a
/// new `SubPartitioner`, which invalidates previous key assignments; the
/// owner only does that while feeding is paused, so no task is in flight
/// across the change.
#[derive(Debug)]
pub struct SubPartitioner {
    concurrency: usize,
    /// Counter for spreading keyless tasks
    next_keyless: AtomicUsize,
}

impl SubPartitioner {
    pub fn new(concurrency: usize) -> Self {
        assert!(concurrency > 0, "concurrency must be at least 1");
        Self {
            concurrency,
            next_keyless: AtomicUsize::new(0),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Route a key to its worker index in [0, concurrency)
    ///
    /// For a non-absent key the result is a stable hash of the key bytes
    /// modulo the concurrency: the same key always yields the same index for
    /// the lifetime of this partitioner. Absent keys cycle across workers.
    pub fn partition_for(&self, key: Option<&[u8]>) -> usize {
        match key {
            Some(key) => {
                let mut hasher = FxHasher::default();
                hasher.write(key);
                (hasher.finish() % self.concurrency as u64) as usize
            }
            None => self.next_keyless.fetch_add(1, Ordering::Relaxed) % self.concurrency,
        }
    }
}
