//! Lock diagnostics configuration
//!
//! Controls what the lock reports about itself through `tracing`. None of
//! these settings change locking behaviour: there is no timeout and no way to
//! give up on an acquisition.
//!
//! Sources, lowest precedence first:
//! - built-in defaults
//! - an optional configuration file (format picked from the extension)
//! - `WIFI_HAL_SYNC_*` environment variables
//!
//! | Key                  | Env variable                        | Default |
//! |----------------------|-------------------------------------|---------|
//! | `slow_acquire_ms`    | `WIFI_HAL_SYNC_SLOW_ACQUIRE_MS`     | 100     |
//! | `trace_acquisitions` | `WIFI_HAL_SYNC_TRACE_ACQUISITIONS`  | false   |
//!
//! `slow_acquire_ms = 0` turns slow-acquisition warnings off.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{Result, SyncError};

/// Environment variable prefix for diagnostics settings
pub const ENV_PREFIX: &str = "WIFI_HAL_SYNC";

/// Default slow-acquisition warning threshold in milliseconds
pub const DEFAULT_SLOW_ACQUIRE_MS: u64 = 100;

static DIAGNOSTICS: OnceLock<LockDiagnosticsConfig> = OnceLock::new();

/// Diagnostics settings for a [`ProcessLock`](crate::ProcessLock)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockDiagnosticsConfig {
    /// Contended acquisitions waiting at least this long are logged at WARN
    pub slow_acquire_threshold: Option<Duration>,
    /// Emit a TRACE event for every acquire and release
    pub trace_acquisitions: bool,
}

impl Default for LockDiagnosticsConfig {
    fn default() -> Self {
        Self {
            slow_acquire_threshold: Some(Duration::from_millis(DEFAULT_SLOW_ACQUIRE_MS)),
            trace_acquisitions: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawDiagnostics {
    slow_acquire_ms: u64,
    trace_acquisitions: bool,
}

impl Default for RawDiagnostics {
    fn default() -> Self {
        Self {
            slow_acquire_ms: DEFAULT_SLOW_ACQUIRE_MS,
            trace_acquisitions: false,
        }
    }
}

impl From<RawDiagnostics> for LockDiagnosticsConfig {
    fn from(raw: RawDiagnostics) -> Self {
        Self {
            slow_acquire_threshold: (raw.slow_acquire_ms > 0)
                .then(|| Duration::from_millis(raw.slow_acquire_ms)),
            trace_acquisitions: raw.trace_acquisitions,
        }
    }
}

impl LockDiagnosticsConfig {
    /// Load settings from an optional file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_from(path, Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    pub(crate) fn load_from(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let raw: RawDiagnostics = builder.add_source(env).build()?.try_deserialize()?;
        Ok(raw.into())
    }

    /// Whether a contended wait of `waited` deserves a warning
    pub fn is_slow(&self, waited: Duration) -> bool {
        self.slow_acquire_threshold
            .is_some_and(|threshold| waited >= threshold)
    }
}

/// Install the process-wide diagnostics settings.
///
/// Can succeed at most once, and only before anything has read the settings
/// through [`diagnostics`]; the first acquisition of the global lock does that.
pub fn install_diagnostics(config: LockDiagnosticsConfig) -> Result<()> {
    DIAGNOSTICS
        .set(config)
        .map_err(|_| SyncError::DiagnosticsAlreadyInstalled)?;
    tracing::info!(config = ?diagnostics(), "Lock diagnostics installed");
    Ok(())
}

/// Process-wide diagnostics settings, defaults when none were installed.
pub fn diagnostics() -> &'static LockDiagnosticsConfig {
    DIAGNOSTICS.get_or_init(LockDiagnosticsConfig::default)
}
