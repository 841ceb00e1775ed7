//! Reentrant process lock
//!
//! A [`ProcessLock`] pairs a `parking_lot` reentrant mutex with the
//! bookkeeping needed to observe it from outside: owner thread, reentrancy
//! depth and usage counters. The raw mutex is the only thing that decides who
//! gets in; everything else is updated by the owner while it holds the raw
//! mutex.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

use super::model::{LockState, LockStats, LockStatsCollector, Ownership};
use crate::config::{self, LockDiagnosticsConfig};

/// A named reentrant mutual-exclusion lock.
///
/// The thread holding the lock may acquire it again without blocking; other
/// threads block until every acquisition made by the owner has been released.
/// Waiters are not served in any particular order.
pub struct ProcessLock {
    name: &'static str,
    raw: ReentrantMutex<()>,
    ownership: Mutex<Ownership>,
    stats: LockStatsCollector,
    diagnostics: Option<LockDiagnosticsConfig>,
}

impl ProcessLock {
    /// Create a lock reporting through the process-wide diagnostics settings
    pub fn new(name: &'static str) -> Self {
        Self::build(name, None)
    }

    /// Create a lock with its own diagnostics settings
    pub fn with_diagnostics(name: &'static str, diagnostics: LockDiagnosticsConfig) -> Self {
        Self::build(name, Some(diagnostics))
    }

    fn build(name: &'static str, diagnostics: Option<LockDiagnosticsConfig>) -> Self {
        Self {
            name,
            raw: ReentrantMutex::new(()),
            ownership: Mutex::new(Ownership::default()),
            stats: LockStatsCollector::new(),
            diagnostics,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Block until the calling thread owns the lock.
    ///
    /// Returns immediately if the calling thread already owns it. The lock is
    /// released when the returned guard is dropped, whichever way the scope
    /// holding it is left. There is no timeout.
    pub fn acquire(&self) -> ProcessLockGuard<'_> {
        let inner = match self.raw.try_lock() {
            Some(inner) => inner,
            None => {
                let started = Instant::now();
                let inner = self.raw.lock();
                self.report_contention(started.elapsed());
                inner
            }
        };

        let depth = {
            let mut ownership = self.ownership.lock();
            ownership.depth += 1;
            if ownership.depth == 1 {
                ownership.owner = Some(thread::current().id());
            }
            ownership.depth
        };
        self.stats.record_acquisition(depth > 1);

        if self.diagnostics().trace_acquisitions {
            tracing::trace!(lock = self.name, depth, "Lock acquired");
        }

        ProcessLockGuard {
            lock: self,
            depth,
            _inner: inner,
        }
    }

    /// Run `f` while holding the lock.
    ///
    /// The lock is released even if `f` panics.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = self.acquire();
        f()
    }

    /// Snapshot of the owner and depth.
    ///
    /// Owner and depth are read together, but the lock may change hands as
    /// soon as this returns.
    pub fn state(&self) -> LockState {
        self.ownership.lock().snapshot()
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.state().is_held_by(thread::current().id())
    }

    /// Depth of the calling thread's ownership, 0 if it does not own the lock
    pub fn current_thread_depth(&self) -> usize {
        match self.state() {
            LockState::Held { owner, depth } if owner == thread::current().id() => depth,
            _ => 0,
        }
    }

    pub fn stats(&self) -> LockStats {
        self.stats.snapshot()
    }

    fn diagnostics(&self) -> &LockDiagnosticsConfig {
        match &self.diagnostics {
            Some(diagnostics) => diagnostics,
            None => config::diagnostics(),
        }
    }

    fn report_contention(&self, waited: Duration) {
        self.stats.record_contention(waited);

        let waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX);
        if self.diagnostics().is_slow(waited) {
            tracing::warn!(lock = self.name, waited_ms, "Slow lock acquisition");
        } else {
            tracing::debug!(lock = self.name, waited_ms, "Contended lock acquisition");
        }
    }
}

impl fmt::Debug for ProcessLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessLock")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Scoped ownership of a [`ProcessLock`].
///
/// Dropping the guard releases one level of ownership. The guard cannot be
/// sent to another thread, so it is always released by the thread that took
/// it.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ProcessLockGuard<'a> {
    lock: &'a ProcessLock,
    depth: usize,
    _inner: ReentrantMutexGuard<'a, ()>,
}

impl ProcessLockGuard<'_> {
    /// Depth of ownership this guard accounts for, 1 for the outermost guard
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_outermost(&self) -> bool {
        self.depth == 1
    }

    pub fn lock_name(&self) -> &'static str {
        self.lock.name
    }
}

impl fmt::Debug for ProcessLockGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessLockGuard")
            .field("lock", &self.lock.name)
            .field("depth", &self.depth)
            .finish()
    }
}

impl Drop for ProcessLockGuard<'_> {
    fn drop(&mut self) {
        // Runs before `_inner` is dropped, so the raw mutex is still held here.
        let remaining = {
            let mut ownership = self.lock.ownership.lock();
            ownership.depth = ownership.depth.saturating_sub(1);
            if ownership.depth == 0 {
                ownership.owner = None;
            }
            ownership.depth
        };

        if self.lock.diagnostics().trace_acquisitions {
            tracing::trace!(lock = self.lock.name, depth = remaining, "Lock released");
        }
    }
}
