//! Engine configuration with hot-reloadable snapshots
//!
//! Configuration values that tune the per-partition engine are distributed
//! as versioned, read-only snapshots: a `ConfigStore` owned by whatever
//! loads properties (file watcher, admin endpoint, etc. — outside this
//! crate) publishes whole `ProcessorConfig` values, and every reader holds a
//! `ConfigHandle` that observes the latest snapshot without locks on the hot
//! path. Readers never see a half-updated configuration.
//!
//! ## Reload semantics
//!
//! - `processing_rate` is read opportunistically by the rate limiter on each
//!   admission, so changes take effect live without pausing feeding.
//! - `partition_concurrency` and `max_pending_tasks` only take effect when
//!   the owner rebuilds the `PartitionProcessor` (feeding must be paused
//!   first; see the processor module docs).

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Processing rate value meaning "no throughput bound"
pub const RATE_UNLIMITED: i64 = -1;

/// Processing rate value meaning "admit nothing until reconfigured"
pub const RATE_PAUSED: i64 = 0;

fn default_concurrency() -> usize {
    1
}

fn default_processing_rate() -> i64 {
    RATE_UNLIMITED
}

fn default_max_pending_tasks() -> usize {
    10_000
}

/// Tunable values for one partition's processing engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Number of worker units per partition
    #[serde(default = "default_concurrency")]
    pub partition_concurrency: usize,

    /// Aggregate admission rate in tasks/sec across all units of a partition.
    /// Negative = unlimited, 0 = paused, positive = tasks/sec.
    #[serde(default = "default_processing_rate")]
    pub processing_rate: i64,

    /// Pending-task queue capacity per worker unit
    #[serde(default = "default_max_pending_tasks")]
    pub max_pending_tasks: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            partition_concurrency: default_concurrency(),
            processing_rate: default_processing_rate(),
            max_pending_tasks: default_max_pending_tasks(),
        }
    }
}

impl ProcessorConfig {
    /// Validate value ranges before the config is published to readers
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partition_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                property: "partition_concurrency",
                reason: "must be a positive integer".to_string(),
            });
        }
        if self.max_pending_tasks == 0 {
            return Err(ConfigError::InvalidValue {
                property: "max_pending_tasks",
                reason: "must be a positive integer".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for '{property}': {reason}")]
    InvalidValue {
        property: &'static str,
        reason: String,
    },
}

/// Owner side of the configuration channel
///
/// Held by the property-loading collaborator. Each successful `update`
/// publishes a complete snapshot to every `ConfigHandle`.
#[derive(Debug)]
pub struct ConfigStore {
    tx: watch::Sender<ProcessorConfig>,
}

impl ConfigStore {
    /// Create a store seeded with the given configuration
    pub fn new(initial: ProcessorConfig) -> Result<Self, ConfigError> {
        initial.validate()?;
        let (tx, _) = watch::channel(initial);
        Ok(Self { tx })
    }

    /// Publish a new snapshot after validating it
    pub fn update(&self, config: ProcessorConfig) -> Result<(), ConfigError> {
        config.validate()?;
        // send_replace never fails; the store keeps its own receiver alive
        // through handle() clones and the stored sender.
        self.tx.send_replace(config);
        Ok(())
    }

    /// Create a read handle observing the latest snapshot
    pub fn handle(&self) -> ConfigHandle {
        ConfigHandle {
            rx: self.tx.subscribe(),
        }
    }

    /// Current snapshot (owner-side convenience)
    pub fn current(&self) -> ProcessorConfig {
        self.tx.borrow().clone()
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        // A default ProcessorConfig always validates.
        Self::new(ProcessorConfig::default()).expect("default config is valid")
    }
}

/// Read handle into the live configuration
///
/// Cheap to clone; `current()` is synchronous and lock-free enough for the
/// worker hot path (a `watch` borrow), so dedicated threads read it without
/// any async runtime.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    rx: watch::Receiver<ProcessorConfig>,
}

impl ConfigHandle {
    /// Latest published snapshot
    pub fn current(&self) -> ProcessorConfig {
        self.rx.borrow().clone()
    }

    /// Latest processing rate without cloning the whole snapshot
    pub fn processing_rate(&self) -> i64 {
        self.rx.borrow().processing_rate
    }
}
