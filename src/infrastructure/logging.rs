//! Centralized file-based logging system
//!
//! Writes logs to files under the logs directory, separated by log type:
//! - main/ - all logs, JSON lines
//! - error/ - WARN and ERROR only (includes mirrored in-app log entries)
//! - api/ - diagnostics server and throttle logs

use std::fs;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

const LOG_TYPES: [&str; 3] = ["main", "error", "api"];

/// Non-blocking writers for each log type
pub struct LogWriters {
    pub main: NonBlocking,
    pub error: NonBlocking,
    pub api: NonBlocking,
    /// Must be kept alive for the duration of the program
    pub guards: Vec<WorkerGuard>,
}

/// Initialize centralized file logging
///
/// Creates one subdirectory per log type under `logs_dir`. The returned
/// guards must be kept alive for the duration of the program. Fails if the
/// directories cannot be created or a global subscriber is already set.
pub fn init_logging(logs_dir: &Path) -> io::Result<Vec<WorkerGuard>> {
    let writers = create_writers(logs_dir)?;

    let main_layer = tracing_subscriber::fmt::layer()
        .with_writer(writers.main)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .json();

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(writers.error)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_filter(tracing_subscriber::filter::LevelFilter::WARN);

    let api_layer = tracing_subscriber::fmt::layer()
        .with_writer(writers.api)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            is_api_target(metadata.target())
        }));

    // Console layer for development
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(main_layer)
        .with(error_layer)
        .with(api_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    tracing::info!("Logging system initialized. Log files in {}", logs_dir.display());

    Ok(writers.guards)
}

/// Create the log type directories and a rolling writer for each
pub fn create_writers(logs_dir: &Path) -> io::Result<LogWriters> {
    for log_type in LOG_TYPES {
        fs::create_dir_all(logs_dir.join(log_type))?;
    }

    let (main, main_guard) = create_appender(logs_dir, "main")?;
    let (error, error_guard) = create_appender(logs_dir, "error")?;
    let (api, api_guard) = create_appender(logs_dir, "api")?;

    Ok(LogWriters {
        main,
        error,
        api,
        guards: vec![main_guard, error_guard, api_guard],
    })
}

/// Create a daily rolling file appender
fn create_appender(logs_dir: &Path, name: &str) -> io::Result<(NonBlocking, WorkerGuard)> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(name)
        .build(logs_dir.join(name))
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    Ok(tracing_appender::non_blocking(appender))
}

fn is_api_target(target: &str) -> bool {
    target.contains("api") || target.contains("server") || target.contains("throttle")
}

/// Log macro helpers for specific log types
#[macro_export]
macro_rules! log_api {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "api", $level, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_pipeline {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "ideahub", $level, $($arg)+)
    };
}
