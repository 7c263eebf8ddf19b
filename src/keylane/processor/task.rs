//! Task request types handed from the transport to the processing engine
//!
//! A `TaskRequest` is one unit of work extracted from the partitioned log:
//! an optional ordering key, an opaque payload, and the transport position
//! (topic, partition, offset) the record was read from. Requests are
//! immutable once created; ownership moves from the transport's poll loop
//! into the engine on submission.

use chrono::{DateTime, Utc};
use std::fmt;

/// Identity of one log partition (topic name + partition number)
///
/// The transport client itself is an external collaborator; this is the
/// positional vocabulary shared across its interface boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPartition {
    topic: String,
    partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// One unit of work extracted from the transport
///
/// Carries the ordering key (absent for keyless records), the payload bytes,
/// and where in the log the record came from. The engine never inspects the
/// payload; deserialization belongs to the user stage chain.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    topic_partition: TopicPartition,
    offset: i64,
    key: Option<Vec<u8>>,
    payload: Vec<u8>,
    record_timestamp: Option<DateTime<Utc>>,
}

impl TaskRequest {
    pub fn new(
        topic_partition: TopicPartition,
        offset: i64,
        key: Option<Vec<u8>>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            topic_partition,
            offset,
            key,
            payload,
            record_timestamp: None,
        }
    }

    /// Attach the record timestamp reported by the transport
    pub fn with_record_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.record_timestamp = Some(timestamp);
        self
    }

    pub fn topic_partition(&self) -> &TopicPartition {
        &self.topic_partition
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Ordering key, if the record carried one
    ///
    /// Tasks sharing a non-absent key are processed in submission order by a
    /// single worker. Keyless tasks have no ordering guarantee.
    pub fn key(&self) -> Option<&[u8]> {
        self.key.as_deref()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn record_timestamp(&self) -> Option<DateTime<Utc>> {
        self.record_timestamp
    }

    /// Compact identity for log lines: "topic-partition@offset"
    pub fn position(&self) -> String {
        format!("{}@{}", self.topic_partition, self.offset)
    }
}
