//! Logging setup for the stress tool.
//!
//! Console output is always human-readable. When a log directory is set, a
//! rolling `wifi-hal-sync-stress.log` file receives the same events.
//!
//! | Env variable            | Meaning                          | Default |
//! |-------------------------|----------------------------------|---------|
//! | `WIFI_HAL_LOG_DIR`      | Directory for the rolling file   | unset   |
//! | `WIFI_HAL_LOG_CONSOLE`  | Console output on/off            | true    |
//! | `WIFI_HAL_LOG_LEVEL`    | Minimum level                    | info    |
//! | `WIFI_HAL_LOG_ROTATION` | minutely, hourly, daily, never   | daily   |
//!
//! `RUST_LOG` overrides the level filter for every layer.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

const LOG_FILE_NAME: &str = "wifi-hal-sync-stress.log";

fn parse_rotation(value: &str) -> Option<Rotation> {
    match value.to_lowercase().as_str() {
        "minutely" => Some(Rotation::MINUTELY),
        "hourly" => Some(Rotation::HOURLY),
        "daily" => Some(Rotation::DAILY),
        "never" => Some(Rotation::NEVER),
        _ => None,
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory for file output, no file output when `None`
    pub log_dir: Option<PathBuf>,
    pub console_output: bool,
    pub level: Level,
    pub rotation: Rotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            console_output: true,
            level: Level::INFO,
            rotation: Rotation::DAILY,
        }
    }
}

impl LoggingConfig {
    /// Create from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let log_dir = lookup("WIFI_HAL_LOG_DIR")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let console_output = lookup("WIFI_HAL_LOG_CONSOLE")
            .map(|v| v.to_lowercase() != "false" && v != "0")
            .unwrap_or(defaults.console_output);

        let level = lookup("WIFI_HAL_LOG_LEVEL")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.level);

        let rotation = lookup("WIFI_HAL_LOG_ROTATION")
            .and_then(|v| parse_rotation(&v))
            .unwrap_or(defaults.rotation);

        Self {
            log_dir,
            console_output,
            level,
            rotation,
        }
    }
}

/// Keeps the non-blocking file writer alive.
///
/// Dropping it flushes buffered output.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let mut file_guard = None;

    if config.console_output {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_filter(level_filter(config.level));
        layers.push(Box::new(console_layer));
    }

    if let Some(log_dir) = &config.log_dir {
        std::fs::create_dir_all(log_dir)?;
        let appender = RollingFileAppender::new(config.rotation.clone(), log_dir, LOG_FILE_NAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);

        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_thread_names(true)
            .with_filter(level_filter(config.level));
        layers.push(Box::new(file_layer));
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

fn level_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()))
}
