//! In-process load runner
//!
//! Drives a full `PartitionProcessor` — real workers, real queues, real
//! admission control — with generated tasks, through a warmup phase and a
//! measured phase, and produces a serializable report. Useful for sizing
//! concurrency and rate settings before wiring the engine to a live
//! transport.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::keylane::config::{ConfigStore, ProcessorConfig, RATE_UNLIMITED};
use crate::keylane::harness::generator::{GeneratorConfig, TaskGenerator};
use crate::keylane::harness::stats::{TaskStats, TaskStatsSnapshot};
use crate::keylane::processor::error::ProcessorError;
use crate::keylane::processor::pipeline::StageSet;
use crate::keylane::processor::scope::{PartitionScope, ThreadScope};
use crate::keylane::processor::shutdown::AsyncShutdown;
use crate::keylane::processor::stage::{ProcessingContext, StageError, TaskProcessor};
use crate::keylane::processor::task::TaskRequest;
use crate::keylane::processor::PartitionProcessor;

/// Parameters for one load run
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Measured task count
    pub tasks: usize,
    /// Tasks fed (and discarded from the stats) before measurement starts
    pub warmup_tasks: usize,
    /// Worker units for the partition under load
    pub concurrency: usize,
    /// Admission rate (negative = unlimited)
    pub processing_rate: i64,
    /// Per-unit queue capacity
    pub max_pending_tasks: usize,
    /// Workload shape
    pub generator: GeneratorConfig,
    /// Busy-work duration simulated by the measuring stage per task
    pub simulated_work: Option<Duration>,
    /// Seed for reproducible runs
    pub seed: Option<u64>,
    /// Give up waiting for drain after this long
    pub drain_timeout: Duration,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            tasks: 10_000,
            warmup_tasks: 1_000,
            concurrency: 4,
            processing_rate: RATE_UNLIMITED,
            max_pending_tasks: 10_000,
            generator: GeneratorConfig::default(),
            simulated_work: None,
            seed: None,
            drain_timeout: Duration::from_secs(60),
        }
    }
}

/// Result of one load run
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub tasks: usize,
    pub concurrency: usize,
    pub processing_rate: i64,
    pub throughput_per_sec: f64,
    pub stats: TaskStatsSnapshot,
    /// True when the run stopped at the drain timeout with tasks missing
    pub timed_out: bool,
}

impl LoadReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Measuring stage: optional busy-work plus stats recording
struct MeasuringStage {
    stats: Arc<TaskStats>,
    simulated_work: Option<Duration>,
}

impl TaskProcessor for MeasuringStage {
    fn process(
        &mut self,
        _context: &mut ProcessingContext,
        task: &TaskRequest,
    ) -> Result<(), StageError> {
        if let Some(work) = self.simulated_work {
            thread::sleep(work);
        }
        let latency = task
            .record_timestamp()
            .and_then(|stamped| (Utc::now() - stamped).to_std().ok())
            .unwrap_or_default();
        self.stats.record_completed(latency);
        Ok(())
    }

    fn name(&self) -> &str {
        "measuring"
    }
}

/// Drives warmup + measurement against a real partition processor
pub struct LoadRunner {
    config: LoadConfig,
}

impl LoadRunner {
    pub fn new(config: LoadConfig) -> Self {
        Self { config }
    }

    /// Execute the run and block until every task drained (or timeout)
    pub fn run(&self) -> Result<LoadReport, ProcessorError> {
        let config = &self.config;
        let store = ConfigStore::new(ProcessorConfig {
            partition_concurrency: config.concurrency,
            processing_rate: config.processing_rate,
            max_pending_tasks: config.max_pending_tasks,
        })?;

        let stats = Arc::new(TaskStats::new());
        let stages = {
            let stats = Arc::clone(&stats);
            let simulated_work = config.simulated_work;
            StageSet::new().stage(move |_scope: &ThreadScope| -> Box<dyn TaskProcessor> {
                Box::new(MeasuringStage {
                    stats: Arc::clone(&stats),
                    simulated_work,
                })
            })
        };

        let scope = PartitionScope::new(
            "load-harness",
            crate::keylane::processor::task::TopicPartition::new(
                config.generator.topic.clone(),
                config.generator.partition,
            ),
            store.handle(),
        );
        let mut processor = PartitionProcessor::new(scope, stages)?;
        let mut generator = TaskGenerator::new(config.generator.clone(), config.seed);

        if config.warmup_tasks > 0 {
            info!("LoadRunner: warming up with {} task(s)", config.warmup_tasks);
            self.feed(&processor, &mut generator, config.warmup_tasks);
            self.wait_for(&stats, config.warmup_tasks as u64);
            stats.reset();
        }

        let started_at = Utc::now();
        let started = Instant::now();
        self.feed(&processor, &mut generator, config.tasks);
        let timed_out = !self.wait_for(&stats, config.tasks as u64);
        let elapsed = started.elapsed();

        processor.shutdown();

        let snapshot = stats.snapshot();
        let report = LoadReport {
            started_at,
            elapsed_ms: elapsed.as_millis() as u64,
            tasks: config.tasks,
            concurrency: config.concurrency,
            processing_rate: config.processing_rate,
            throughput_per_sec: if elapsed.as_secs_f64() > 0.0 {
                snapshot.completed as f64 / elapsed.as_secs_f64()
            } else {
                0.0
            },
            stats: snapshot,
            timed_out,
        };
        info!(
            "LoadRunner: {} task(s) in {}ms ({:.0} tasks/sec)",
            report.stats.completed, report.elapsed_ms, report.throughput_per_sec
        );
        Ok(report)
    }

    /// Feed with bounded retry when a unit queue saturates
    fn feed(&self, processor: &PartitionProcessor, generator: &mut TaskGenerator, count: usize) {
        for _ in 0..count {
            let task = generator.next_task();
            loop {
                match processor.add_task(task.clone()) {
                    Ok(()) => break,
                    Err(ProcessorError::QueueFull { .. }) => {
                        // The real transport would pause fetching here and
                        // redeliver from its un-committed offset.
                        thread::sleep(Duration::from_micros(200));
                    }
                    Err(other) => {
                        warn!("LoadRunner: task rejected: {}", other);
                        return;
                    }
                }
            }
        }
    }

    /// Poll until the stats reach `expected`; false on timeout
    fn wait_for(&self, stats: &TaskStats, expected: u64) -> bool {
        let deadline = Instant::now() + self.config.drain_timeout;
        while stats.total() < expected {
            if Instant::now() >= deadline {
                warn!(
                    "LoadRunner: drain timeout with {}/{} task(s) accounted for",
                    stats.total(),
                    expected
                );
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }
}
