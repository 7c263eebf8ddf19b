//! Synthetic task generation for load runs
//!
//! Produces `TaskRequest`s over a bounded keyspace with a configurable
//! share of keyless tasks and random payloads. Seedable so a run can be
//! reproduced exactly.

use chrono::Utc;
use rand::prelude::*;

use crate::keylane::processor::task::{TaskRequest, TopicPartition};

/// Shape of the generated workload
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Number of distinct ordering keys to draw from
    pub keyspace: usize,
    /// Fraction of tasks generated without a key (0.0 - 1.0)
    pub keyless_ratio: f64,
    /// Payload size in bytes
    pub payload_size: usize,
    /// Topic name stamped on generated tasks
    pub topic: String,
    /// Partition number stamped on generated tasks
    pub partition: i32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            keyspace: 1_000,
            keyless_ratio: 0.0,
            payload_size: 128,
            topic: "load".to_string(),
            partition: 0,
        }
    }
}

/// Seedable `TaskRequest` source with monotonically increasing offsets
pub struct TaskGenerator {
    config: GeneratorConfig,
    rng: StdRng,
    next_offset: i64,
}

impl TaskGenerator {
    /// Create a generator; pass a seed to make the run reproducible
    pub fn new(config: GeneratorConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng,
            next_offset: 0,
        }
    }

    /// Produce the next task, stamped with the generation time
    pub fn next_task(&mut self) -> TaskRequest {
        let key = if self.config.keyless_ratio > 0.0
            && self.rng.gen::<f64>() < self.config.keyless_ratio
        {
            None
        } else {
            let key_id = self.rng.gen_range(0..self.config.keyspace.max(1));
            Some(format!("key-{}", key_id).into_bytes())
        };

        let mut payload = vec![0u8; self.config.payload_size];
        self.rng.fill(payload.as_mut_slice());

        let offset = self.next_offset;
        self.next_offset += 1;

        TaskRequest::new(
            TopicPartition::new(self.config.topic.clone(), self.config.partition),
            offset,
            key,
            payload,
        )
        .with_record_timestamp(Utc::now())
    }
}
