//! Error types for wifi-hal-sync
//!
//! Acquiring a lock never fails, it can only block. The errors here come from
//! the diagnostics configuration surface.

/// Errors raised while loading or installing lock diagnostics
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("lock diagnostics already installed")]
    DiagnosticsAlreadyInstalled,
}

pub type Result<T> = std::result::Result<T, SyncError>;
