//! wifi-hal-sync - Serialization for the Wi-Fi HAL service
//!
//! The service exposes many entry points that can be called concurrently by
//! the RPC layer. Each of them takes one process-wide reentrant lock before
//! touching shared state, which makes the service look single-threaded to
//! its own internals while still allowing one operation to call another.
//!
//! This crate provides:
//! - The process-wide lock and its scoped guard
//! - Reusable `ProcessLock` instances with state and usage snapshots
//! - Contention diagnostics reported through `tracing`
//! - Diagnostics configuration loading

pub mod config;
pub mod error;
pub mod lock;

// Re-exports for convenience
pub use crate::config::{LockDiagnosticsConfig, diagnostics, install_diagnostics};
pub use error::{Result, SyncError};
pub use lock::{
    GLOBAL_LOCK_NAME, GlobalLockGuard, LockState, LockStats, ProcessLock, ProcessLockGuard,
    acquire_global_lock, global_lock, with_global_lock,
};
