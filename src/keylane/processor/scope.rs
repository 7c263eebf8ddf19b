//! Identity scopes for partitions and their worker threads
//!
//! A `PartitionScope` bundles everything that identifies one assigned
//! partition (subscription id + topic partition) with the read handle into
//! the live configuration. A `ThreadScope` narrows that to one worker unit
//! within the partition. Both are immutable; every unit of a partition
//! shares the same `PartitionScope` behind an `Arc`.

use std::fmt;
use std::sync::Arc;

use crate::keylane::config::ConfigHandle;
use crate::keylane::processor::task::TopicPartition;

/// Identity + configuration for one assigned partition
#[derive(Debug, Clone)]
pub struct PartitionScope {
    subscription_id: String,
    topic_partition: TopicPartition,
    config: ConfigHandle,
}

impl PartitionScope {
    pub fn new(
        subscription_id: impl Into<String>,
        topic_partition: TopicPartition,
        config: ConfigHandle,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            topic_partition,
            config,
        }
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn topic_partition(&self) -> &TopicPartition {
        &self.topic_partition
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }
}

impl fmt::Display for PartitionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subscription_id, self.topic_partition)
    }
}

/// Identity of one worker unit (sub-partition) within a partition
///
/// Created once per unit; owned by that unit for its lifetime.
#[derive(Debug, Clone)]
pub struct ThreadScope {
    partition: Arc<PartitionScope>,
    subpartition: usize,
}

impl ThreadScope {
    pub fn new(partition: Arc<PartitionScope>, subpartition: usize) -> Self {
        Self {
            partition,
            subpartition,
        }
    }

    pub fn partition(&self) -> &PartitionScope {
        &self.partition
    }

    pub fn subpartition(&self) -> usize {
        self.subpartition
    }

    pub fn subscription_id(&self) -> &str {
        self.partition.subscription_id()
    }

    pub fn topic_partition(&self) -> &TopicPartition {
        self.partition.topic_partition()
    }

    pub fn config(&self) -> &ConfigHandle {
        self.partition.config()
    }

    /// Name for the unit's worker thread
    pub fn thread_name(&self) -> String {
        format!(
            "keylane-worker-{}-{}-{}",
            self.partition.subscription_id(),
            self.partition.topic_partition(),
            self.subpartition
        )
    }
}

impl fmt::Display for ThreadScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.partition, self.subpartition)
    }
}
