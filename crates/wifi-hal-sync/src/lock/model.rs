//! Process lock data model
//!
//! Snapshots of who owns a [`ProcessLock`](super::ProcessLock) and how it has
//! been used so far. These are read-only views; nothing here takes part in
//! the locking protocol itself.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::ThreadId;
use std::time::Duration;

/// Externally observable lock state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockState {
    /// Nobody owns the lock
    #[default]
    Free,
    /// Owned by `owner`, entered `depth` times without a matching release
    Held { owner: ThreadId, depth: usize },
}

impl LockState {
    pub fn is_free(&self) -> bool {
        matches!(self, LockState::Free)
    }

    /// Check if the given thread owns the lock in this snapshot
    pub fn is_held_by(&self, thread: ThreadId) -> bool {
        matches!(self, LockState::Held { owner, .. } if *owner == thread)
    }

    /// Reentrancy depth, zero when free
    pub fn depth(&self) -> usize {
        match self {
            LockState::Free => 0,
            LockState::Held { depth, .. } => *depth,
        }
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockState::Free => write!(f, "free"),
            LockState::Held { owner, depth } => write!(f, "held by {:?} (depth {})", owner, depth),
        }
    }
}

/// Owner bookkeeping kept next to the raw reentrant mutex.
///
/// Only the owning thread writes it, always while holding the raw mutex, so
/// `owner` and `depth` change together.
#[derive(Debug, Default)]
pub(crate) struct Ownership {
    pub(crate) owner: Option<ThreadId>,
    pub(crate) depth: usize,
}

impl Ownership {
    pub(crate) fn snapshot(&self) -> LockState {
        match self.owner {
            Some(owner) if self.depth > 0 => LockState::Held {
                owner,
                depth: self.depth,
            },
            _ => LockState::Free,
        }
    }
}

/// Lock usage counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockStats {
    /// Every successful acquisition, reentrant ones included
    pub acquisitions: u64,
    /// Acquisitions by a thread that already owned the lock
    pub reentrant_acquisitions: u64,
    /// Acquisitions that had to wait for another thread
    pub contended_acquisitions: u64,
    /// Total time spent waiting in contended acquisitions
    pub total_wait: Duration,
}

impl LockStats {
    /// Average wait of a contended acquisition
    pub fn avg_contended_wait(&self) -> Duration {
        if self.contended_acquisitions == 0 {
            return Duration::ZERO;
        }
        let avg_nanos = self.total_wait.as_nanos() / u128::from(self.contended_acquisitions);
        Duration::from_nanos(u64::try_from(avg_nanos).unwrap_or(u64::MAX))
    }
}

pub(crate) struct LockStatsCollector {
    acquisitions: AtomicU64,
    reentrant_acquisitions: AtomicU64,
    contended_acquisitions: AtomicU64,
    total_wait_nanos: AtomicU64,
}

impl LockStatsCollector {
    pub(crate) const fn new() -> Self {
        Self {
            acquisitions: AtomicU64::new(0),
            reentrant_acquisitions: AtomicU64::new(0),
            contended_acquisitions: AtomicU64::new(0),
            total_wait_nanos: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_acquisition(&self, reentrant: bool) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        if reentrant {
            self.reentrant_acquisitions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_contention(&self, waited: Duration) {
        let nanos = u64::try_from(waited.as_nanos()).unwrap_or(u64::MAX);
        self.contended_acquisitions.fetch_add(1, Ordering::Relaxed);
        self.total_wait_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> LockStats {
        LockStats {
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            reentrant_acquisitions: self.reentrant_acquisitions.load(Ordering::Relaxed),
            contended_acquisitions: self.contended_acquisitions.load(Ordering::Relaxed),
            total_wait: Duration::from_nanos(self.total_wait_nanos.load(Ordering::Relaxed)),
        }
    }
}

impl Default for LockStatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_state_default_is_free() {
        let state = LockState::default();
        assert!(state.is_free());
        assert_eq!(state.depth(), 0);
        assert!(!state.is_held_by(std::thread::current().id()));
        assert_eq!(state.to_string(), "free");
    }

    #[test]
    fn test_ownership_snapshot() {
        let me = std::thread::current().id();
        let mut ownership = Ownership::default();
        assert_eq!(ownership.snapshot(), LockState::Free);

        ownership.owner = Some(me);
        ownership.depth = 2;
        let state = ownership.snapshot();
        assert!(state.is_held_by(me));
        assert_eq!(state.depth(), 2);

        // An owner with no depth is never reported as held
        ownership.depth = 0;
        assert_eq!(ownership.snapshot(), LockState::Free);
    }

    #[test]
    fn test_stats_collector() {
        let collector = LockStatsCollector::new();
        collector.record_acquisition(false);
        collector.record_acquisition(true);
        collector.record_contention(Duration::from_millis(4));
        collector.record_contention(Duration::from_millis(2));

        let stats = collector.snapshot();
        assert_eq!(stats.acquisitions, 2);
        assert_eq!(stats.reentrant_acquisitions, 1);
        assert_eq!(stats.contended_acquisitions, 2);
        assert_eq!(stats.total_wait, Duration::from_millis(6));
        assert_eq!(stats.avg_contended_wait(), Duration::from_millis(3));
    }

    #[test]
    fn test_avg_wait_without_contention() {
        assert_eq!(LockStats::default().avg_contended_wait(), Duration::ZERO);
    }
}
