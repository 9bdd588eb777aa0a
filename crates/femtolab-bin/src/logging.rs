//! Logging setup
//!
//! Every run writes to a fresh `log_<YYYYMMDD_HHMMSS>.log` in the configured
//! directory and optionally mirrors to stdout. `RUST_LOG` overrides the
//! configured level. `main` holds the returned guard for the whole run.

use crate::config::LoggingConfig;
use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Tracing configuration options
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: Level,
    /// Directory receiving the log file
    pub directory: PathBuf,
    /// Whether to mirror events to stdout
    pub console: bool,
    /// Whether to enable ANSI colors on stdout
    pub ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            directory: PathBuf::from("logs"),
            console: true,
            ansi: true,
        }
    }
}

impl TracingConfig {
    /// Create tracing config from the `[logging]` section
    pub fn from_logging_config(config: &LoggingConfig) -> Result<Self, String> {
        Ok(Self {
            level: parse_log_level(&config.level)?,
            directory: config.directory.clone(),
            console: config.console,
            ..Default::default()
        })
    }

    /// Override the level
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Enable or disable the stdout mirror
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.console = enabled;
        self
    }
}

/// Install the global subscriber and return the file writer's guard.
///
/// Events still buffered when the guard drops are flushed, so keep it alive
/// until the program exits. Calling this when a subscriber is already set is
/// not an error; the new log file is created but receives nothing.
pub fn init(config: TracingConfig) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!(
            "failed to create log directory {}",
            config.directory.display()
        )
    })?;

    let file_name = log_file_name(chrono::Local::now());
    let appender = tracing_appender::rolling::never(&config.directory, &file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_to_filter_string(config.level)));

    let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
    let console_layer = config
        .console
        .then(|| fmt::layer().with_writer(std::io::stdout).with_ansi(config.ansi));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .or_else(|e| {
            // Tests and repeated setup may have installed one already
            if e.to_string().contains("already") {
                Ok(())
            } else {
                Err(anyhow::anyhow!("Failed to initialize tracing: {}", e))
            }
        })?;

    tracing::info!(
        "Logger initialized. Log file: {}",
        log_path(&config.directory, &file_name).display()
    );
    Ok(guard)
}

fn log_file_name<Tz: chrono::TimeZone>(now: chrono::DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("log_{}.log", now.format("%Y%m%d_%H%M%S"))
}

fn log_path(directory: &Path, file_name: &str) -> PathBuf {
    directory.join(file_name)
}

/// Parse log level string into tracing Level
pub fn parse_log_level(level: &str) -> Result<Level, String> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(format!(
            "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        )),
    }
}

fn level_to_filter_string(level: Level) -> String {
    match level {
        Level::TRACE => "trace".to_string(),
        Level::DEBUG => "debug".to_string(),
        Level::INFO => "info".to_string(),
        Level::WARN => "warn".to_string(),
        Level::ERROR => "error".to_string(),
    }
}
