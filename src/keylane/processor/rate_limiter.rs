//! Admission-control gates bounding aggregate task throughput
//!
//! One rate limiter instance is shared by all worker units of a partition:
//! fairness across sub-partitions is traded for control of the partition's
//! total processing rate. Workers block inside `acquire()` until admission
//! is permitted; `close()` releases every blocked worker and turns
//! subsequent calls into an immediate `Closed` outcome, which is the
//! shutdown fast-path.
//!
//! ## Rate values
//!
//! - negative (`RATE_UNLIMITED`) — no bound; `acquire()` is a no-op
//! - `0` (`RATE_PAUSED`) — admit nothing until reconfigured or closed
//! - positive — tasks/sec with one second's worth of burst capacity
//!
//! `DynamicRateLimiter` re-reads the configured rate on each admission and
//! swaps the underlying gate when it changed, so a property update takes
//! effect without rebuilding the unit pool or pausing feeding.

use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::keylane::config::{ConfigHandle, RATE_PAUSED};

/// Result of one admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Task may proceed; carries the time spent waiting for admission
    Admitted(Duration),
    /// The limiter was closed; the caller is shutting down
    Closed,
}

/// Blocking admission gate shared across one partition's workers
pub trait RateLimiter: Send + Sync {
    /// Block until a permit is available or the limiter is closed
    fn acquire(&self) -> AcquireOutcome;

    /// Release blocked callers and make subsequent acquires return
    /// `Closed` immediately. Idempotent.
    fn close(&self);
}

/// Build the gate matching a configured rate value
pub fn create_rate_limiter(rate: i64) -> Arc<dyn RateLimiter> {
    if rate < RATE_PAUSED {
        Arc::new(UnlimitedRateLimiter::new())
    } else if rate == RATE_PAUSED {
        Arc::new(PausedRateLimiter::new())
    } else {
        Arc::new(AverageRateLimiter::new(rate as u64))
    }
}

/// No-op gate for unbounded processing
#[derive(Debug, Default)]
pub struct UnlimitedRateLimiter {
    closed: AtomicBool,
}

impl UnlimitedRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimiter for UnlimitedRateLimiter {
    fn acquire(&self) -> AcquireOutcome {
        if self.closed.load(Ordering::Acquire) {
            AcquireOutcome::Closed
        } else {
            AcquireOutcome::Admitted(Duration::ZERO)
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Gate that admits nothing until closed (rate = 0)
///
/// Used while an operator has paused processing; workers park here and are
/// released either by a rate change (the dynamic limiter closes this gate
/// and installs a new one) or by shutdown.
#[derive(Debug, Default)]
pub struct PausedRateLimiter {
    closed: Mutex<bool>,
    wakeup: Condvar,
}

impl PausedRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimiter for PausedRateLimiter {
    fn acquire(&self) -> AcquireOutcome {
        let mut closed = self.closed.lock().unwrap();
        while !*closed {
            closed = self.wakeup.wait(closed).unwrap();
        }
        AcquireOutcome::Closed
    }

    fn close(&self) {
        let mut closed = self.closed.lock().unwrap();
        *closed = true;
        self.wakeup.notify_all();
    }
}

#[derive(Debug)]
struct Bucket {
    /// Fractional permits currently stored, capped at one second's worth
    stored_permits: f64,
    /// Last refill point
    last_refill: Instant,
}

/// Token-bucket gate pacing admission to an average rate
///
/// Permits accumulate at `rate` per second up to a burst ceiling of one
/// second's worth, so a partition that fell idle may catch up briefly before
/// settling back to the configured average.
#[derive(Debug)]
pub struct AverageRateLimiter {
    rate: u64,
    bucket: Mutex<Bucket>,
    wakeup: Condvar,
    closed: AtomicBool,
}

impl AverageRateLimiter {
    pub fn new(rate: u64) -> Self {
        assert!(rate > 0, "rate must be positive; use create_rate_limiter for other values");
        Self {
            rate,
            bucket: Mutex::new(Bucket {
                stored_permits: 1.0,
                last_refill: Instant::now(),
            }),
            wakeup: Condvar::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn rate(&self) -> u64 {
        self.rate
    }
}

impl RateLimiter for AverageRateLimiter {
    fn acquire(&self) -> AcquireOutcome {
        let start = Instant::now();
        let max_stored = self.rate as f64;
        let mut bucket = self.bucket.lock().unwrap();

        loop {
            if self.closed.load(Ordering::Acquire) {
                return AcquireOutcome::Closed;
            }

            let now = Instant::now();
            let elapsed = now.duration_since(bucket.last_refill);
            bucket.stored_permits =
                (bucket.stored_permits + elapsed.as_secs_f64() * self.rate as f64).min(max_stored);
            bucket.last_refill = now;

            if bucket.stored_permits >= 1.0 {
                bucket.stored_permits -= 1.0;
                return AcquireOutcome::Admitted(start.elapsed());
            }

            // Sleep until the deficit refills; close() interrupts the wait.
            let deficit = 1.0 - bucket.stored_permits;
            let wait = Duration::from_secs_f64(deficit / self.rate as f64);
            let (guard, _timeout) = self.wakeup.wait_timeout(bucket, wait).unwrap();
            bucket = guard;
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // Take the lock so no sleeper can miss the flag between its check
        // and its wait.
        let _bucket = self.bucket.lock().unwrap();
        self.wakeup.notify_all();
    }
}

struct CurrentGate {
    rate: i64,
    limiter: Arc<dyn RateLimiter>,
}

/// How often a paused dynamic limiter re-reads the configured rate
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Rate limiter that follows the live configuration
///
/// Reads the configured rate from the partition's `ConfigHandle` shortly
/// before each admission; when the value changed, the superseded gate is
/// closed (releasing any workers parked on it) and a gate for the new rate
/// takes its place. Workers released that way simply re-acquire against the
/// new gate, so a reconfiguration never drops or duplicates an admission.
///
/// The paused state (rate 0) is handled here rather than delegated to a
/// blocking gate: a worker parked inside an inner gate would only notice a
/// rate change on its next acquire, which for an indefinite pause would be
/// never. Paused workers instead poll the handle at a short interval.
pub struct DynamicRateLimiter {
    config: ConfigHandle,
    current: Mutex<CurrentGate>,
    closed: AtomicBool,
}

impl DynamicRateLimiter {
    pub fn new(config: ConfigHandle) -> Self {
        let rate = config.processing_rate();
        debug!("DynamicRateLimiter: starting with rate {}", rate);
        Self {
            config,
            current: Mutex::new(CurrentGate {
                rate,
                limiter: create_rate_limiter(rate),
            }),
            closed: AtomicBool::new(false),
        }
    }

    /// Install a gate for the given rate if it differs from the current
    /// one, and return the gate to acquire against.
    fn reconcile(&self, rate: i64) -> Arc<dyn RateLimiter> {
        let mut current = self.current.lock().unwrap();
        if current.rate != rate {
            info!(
                "DynamicRateLimiter: processing rate changed {} -> {}",
                current.rate, rate
            );
            let superseded = std::mem::replace(&mut current.limiter, create_rate_limiter(rate));
            current.rate = rate;
            drop(current);
            superseded.close();
            return self.current.lock().unwrap().limiter.clone();
        }
        current.limiter.clone()
    }
}

impl RateLimiter for DynamicRateLimiter {
    fn acquire(&self) -> AcquireOutcome {
        // Time genuinely spent blocked; reconcile overhead is not a wait.
        let mut blocked = Duration::ZERO;
        loop {
            if self.closed.load(Ordering::Acquire) {
                return AcquireOutcome::Closed;
            }

            let rate = self.config.processing_rate();
            if rate == RATE_PAUSED {
                let slept = Instant::now();
                std::thread::sleep(PAUSE_POLL_INTERVAL);
                blocked += slept.elapsed();
                continue;
            }

            let gate = self.reconcile(rate);
            match gate.acquire() {
                AcquireOutcome::Admitted(waited) => {
                    return AcquireOutcome::Admitted(blocked + waited);
                }
                AcquireOutcome::Closed => {
                    if self.closed.load(Ordering::Acquire) {
                        return AcquireOutcome::Closed;
                    }
                    // The gate we held was superseded by a rate change;
                    // retry against the replacement.
                }
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let current = self.current.lock().unwrap();
        current.limiter.close();
    }
}
