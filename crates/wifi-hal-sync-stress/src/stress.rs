//! Mutual exclusion stress run
//!
//! Worker threads repeatedly enter a serialized "service call" that re-enters
//! itself a few levels deep, the way one HAL operation calls another. The
//! outermost level of each call checks an occupancy counter; finding another
//! thread already inside is a violation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ScopedJoinHandle};
use std::time::{Duration, Instant};

use wifi_hal_sync::{LockStats, ProcessLock};

/// Stress run parameters
#[derive(Debug, Clone)]
pub struct StressConfig {
    pub threads: usize,
    /// Top-level calls per thread
    pub iterations: usize,
    /// Nesting cycles through `1..=max_depth`
    pub max_depth: usize,
    /// Time spent inside the innermost level of each call
    pub hold: Duration,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            iterations: 10_000,
            max_depth: 4,
            hold: Duration::ZERO,
        }
    }
}

impl StressConfig {
    fn validate(&self) -> Result<(), StressError> {
        if self.threads == 0 {
            return Err(StressError::InvalidConfig(
                "threads must be at least 1".to_string(),
            ));
        }
        if self.max_depth == 0 {
            return Err(StressError::InvalidConfig(
                "max_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StressError {
    #[error("invalid stress configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn worker {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("worker {0} panicked")]
    WorkerPanicked(usize),
}

/// Outcome of a stress run
#[derive(Debug, Clone)]
pub struct StressReport {
    pub lock: &'static str,
    pub threads: usize,
    pub iterations: usize,
    /// Overlaps between threads plus inconsistent depth bookkeeping
    pub violations: usize,
    pub deepest_nesting: usize,
    pub elapsed: Duration,
    /// Lock counters accumulated during the run
    pub stats: LockStats,
}

impl StressReport {
    pub fn is_clean(&self) -> bool {
        self.violations == 0
    }

    pub fn log(&self) {
        let elapsed_ms = u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX);
        let avg_wait_us =
            u64::try_from(self.stats.avg_contended_wait().as_micros()).unwrap_or(u64::MAX);
        tracing::info!(
            lock = self.lock,
            threads = self.threads,
            iterations = self.iterations,
            violations = self.violations,
            deepest_nesting = self.deepest_nesting,
            elapsed_ms,
            acquisitions = self.stats.acquisitions,
            reentrant = self.stats.reentrant_acquisitions,
            contended = self.stats.contended_acquisitions,
            avg_wait_us,
            "Stress run finished"
        );
    }
}

struct Shared<'a> {
    lock: &'a ProcessLock,
    hold: Duration,
    occupancy: AtomicUsize,
    violations: AtomicUsize,
    deepest: AtomicUsize,
}

impl Shared<'_> {
    fn serialized_call(&self, remaining: usize) {
        let guard = self.lock.acquire();

        if guard.is_outermost() && self.occupancy.fetch_add(1, Ordering::SeqCst) != 0 {
            self.violations.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(
                lock = guard.lock_name(),
                "Another thread is inside the critical section"
            );
        }
        if self.lock.current_thread_depth() != guard.depth() {
            self.violations.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(
                lock = guard.lock_name(),
                depth = guard.depth(),
                "Depth bookkeeping out of step"
            );
        }
        self.deepest.fetch_max(guard.depth(), Ordering::Relaxed);

        if remaining > 0 {
            self.serialized_call(remaining - 1);
        } else if !self.hold.is_zero() {
            thread::sleep(self.hold);
        }

        if guard.is_outermost() {
            self.occupancy.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Hammer `lock` from `config.threads` threads.
///
/// Counters in the report cover only this run, even if `lock` was used
/// before.
pub fn run(lock: &ProcessLock, config: &StressConfig) -> Result<StressReport, StressError> {
    config.validate()?;

    let shared = Shared {
        lock,
        hold: config.hold,
        occupancy: AtomicUsize::new(0),
        violations: AtomicUsize::new(0),
        deepest: AtomicUsize::new(0),
    };
    let stats_before = lock.stats();

    tracing::info!(
        lock = lock.name(),
        threads = config.threads,
        iterations = config.iterations,
        max_depth = config.max_depth,
        "Stress run starting"
    );
    let started = Instant::now();

    thread::scope(|scope| {
        let mut workers = Vec::with_capacity(config.threads);
        let mut spawn_error = None;
        for index in 0..config.threads {
            let shared = &shared;
            let spawned = thread::Builder::new()
                .name(format!("stress-{}", index))
                .spawn_scoped(scope, move || {
                    for i in 0..config.iterations {
                        shared.serialized_call(i % config.max_depth);
                    }
                });
            match spawned {
                Ok(worker) => workers.push(worker),
                Err(source) => {
                    spawn_error = Some(StressError::Spawn { index, source });
                    break;
                }
            }
        }

        let joined = join_workers(workers);
        match spawn_error {
            Some(err) => Err(err),
            None => joined,
        }
    })?;

    Ok(StressReport {
        lock: lock.name(),
        threads: config.threads,
        iterations: config.iterations,
        violations: shared.violations.load(Ordering::SeqCst),
        deepest_nesting: shared.deepest.load(Ordering::Relaxed),
        elapsed: started.elapsed(),
        stats: stats_delta(stats_before, lock.stats()),
    })
}

/// Join every worker, then report the first one that panicked
fn join_workers(workers: Vec<ScopedJoinHandle<'_, ()>>) -> Result<(), StressError> {
    let mut first_panic = None;
    for (index, worker) in workers.into_iter().enumerate() {
        if worker.join().is_err() && first_panic.is_none() {
            first_panic = Some(index);
        }
    }

    match first_panic {
        Some(index) => Err(StressError::WorkerPanicked(index)),
        None => Ok(()),
    }
}

fn stats_delta(before: LockStats, after: LockStats) -> LockStats {
    LockStats {
        acquisitions: after.acquisitions - before.acquisitions,
        reentrant_acquisitions: after.reentrant_acquisitions - before.reentrant_acquisitions,
        contended_acquisitions: after.contended_acquisitions - before.contended_acquisitions,
        total_wait: after.total_wait.saturating_sub(before.total_wait),
    }
}
