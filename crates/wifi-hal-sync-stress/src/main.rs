//! wifi-hal-sync-stress - checks the service lock under load
//!
//! Installs lock diagnostics, runs the stress workload against the
//! process-wide lock and exits non-zero if mutual exclusion was ever broken.

mod logging;
mod stress;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::Level;
use wifi_hal_sync::{LockDiagnosticsConfig, global_lock, install_diagnostics};

use logging::{LoggingConfig, init_logging};
use stress::StressConfig;

/// Command line arguments for the stress tool
#[derive(Debug, Parser)]
#[command(
    name = "wifi-hal-sync-stress",
    about = "Hammer the Wi-Fi HAL service lock from many threads"
)]
struct Cli {
    /// Worker threads
    #[arg(
        short = 't',
        long,
        default_value_t = 8,
        env = "WIFI_HAL_STRESS_THREADS"
    )]
    threads: usize,
    /// Top-level calls per thread
    #[arg(short = 'n', long, default_value_t = 10_000)]
    iterations: usize,
    /// Deepest re-entry of a single call
    #[arg(short = 'd', long, default_value_t = 4)]
    max_depth: usize,
    /// Microseconds spent inside the innermost level of each call
    #[arg(long, default_value_t = 0)]
    hold_micros: u64,
    /// Lock diagnostics file
    #[arg(short = 'c', long = "config", env = "WIFI_HAL_SYNC_CONFIG")]
    config: Option<PathBuf>,
    /// Log level, overrides WIFI_HAL_LOG_LEVEL
    #[arg(long = "log-level")]
    log_level: Option<Level>,
    /// Directory for a rolling log file, overrides WIFI_HAL_LOG_DIR
    #[arg(long = "log-dir")]
    log_dir: Option<PathBuf>,
}

impl Cli {
    fn logging_config(&self) -> LoggingConfig {
        let mut config = LoggingConfig::from_env();
        if let Some(level) = self.log_level {
            config.level = level;
        }
        if let Some(log_dir) = &self.log_dir {
            config.log_dir = Some(log_dir.clone());
        }
        config
    }

    fn stress_config(&self) -> StressConfig {
        StressConfig {
            threads: self.threads,
            iterations: self.iterations,
            max_depth: self.max_depth,
            hold: Duration::from_micros(self.hold_micros),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _logging = init_logging(&cli.logging_config()).context("failed to initialize logging")?;

    let diagnostics = LockDiagnosticsConfig::load(cli.config.as_deref())
        .context("failed to load lock diagnostics")?;
    install_diagnostics(diagnostics)?;

    let report = stress::run(global_lock(), &cli.stress_config())?;
    report.log();

    if !report.is_clean() {
        anyhow::bail!(
            "{} mutual exclusion violations on lock '{}'",
            report.violations,
            report.lock
        );
    }
    Ok(())
}
