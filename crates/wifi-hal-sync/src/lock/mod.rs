//! Reentrant process lock
//!
//! This module provides:
//! - Lock state and usage model
//! - The reentrant `ProcessLock` and its scoped guard
//! - The process-wide service lock

mod global;
mod model;
mod process;

pub use global::*;
pub use model::{LockState, LockStats};
pub use process::*;
