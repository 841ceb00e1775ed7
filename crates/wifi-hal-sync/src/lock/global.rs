//! The process-wide service lock
//!
//! Every externally invokable service operation that touches shared state
//! takes this lock first and keeps the guard for the whole call:
//!
//! ```
//! use wifi_hal_sync::acquire_global_lock;
//!
//! fn start_scan() -> Result<(), String> {
//!     let _lock = acquire_global_lock();
//!     // shared service state is only touched while `_lock` is alive
//!     Ok(())
//! }
//!
//! start_scan().unwrap();
//! ```
//!
//! Operations may call each other on the same thread; the nested acquisition
//! returns immediately.

use std::sync::LazyLock;

use super::process::{ProcessLock, ProcessLockGuard};

/// Name reported by the global lock in diagnostics
pub const GLOBAL_LOCK_NAME: &str = "wifi-hal-global";

static GLOBAL_LOCK: LazyLock<ProcessLock> = LazyLock::new(|| ProcessLock::new(GLOBAL_LOCK_NAME));

/// Guard returned by [`acquire_global_lock`]
pub type GlobalLockGuard = ProcessLockGuard<'static>;

/// The process-wide lock, created on first use and never destroyed
pub fn global_lock() -> &'static ProcessLock {
    &GLOBAL_LOCK
}

/// Acquire the process-wide lock, blocking until it is available.
///
/// Re-acquiring on a thread that already holds it does not block.
pub fn acquire_global_lock() -> GlobalLockGuard {
    GLOBAL_LOCK.acquire()
}

/// Run `f` while holding the process-wide lock
pub fn with_global_lock<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    GLOBAL_LOCK.with(f)
}
