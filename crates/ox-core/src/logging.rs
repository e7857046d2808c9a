//! Logging infrastructure for oxidized-sync

use std::fs::File;
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, LogLevel};

/// Map a configured log level to a tracing level, `None` for `Off`
pub fn level_for(log_level: LogLevel) -> Option<Level> {
    match log_level {
        LogLevel::Off => None,
        LogLevel::Error => Some(Level::ERROR),
        LogLevel::Warn => Some(Level::WARN),
        LogLevel::Info => Some(Level::INFO),
        LogLevel::Debug => Some(Level::DEBUG),
        LogLevel::Trace => Some(Level::TRACE),
    }
}

/// Filter at `level` unless `RUST_LOG` names its own directives
fn filter_for(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Initialize the logging system based on configuration.
///
/// Console output always; a plain-text copy goes to `debug.log_path` when
/// `debug.log_to_file` is set and the file can be created.
pub fn init(config: &Config) {
    let Some(level) = level_for(config.debug.log_level) else {
        return;
    };

    let mut file_error = None;
    let file_layer = if config.debug.log_to_file {
        match File::create(&config.debug.log_path) {
            Ok(file) => Some(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false)),
            Err(e) => {
                file_error = Some(e);
                None
            }
        }
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(filter_for(level))
        .with(fmt::layer().with_target(true).with_thread_names(true))
        .with(file_layer)
        .try_init()
        .is_ok();

    if let (true, Some(e)) = (installed, file_error) {
        tracing::warn!(
            "cannot write log file {}: {}",
            config.debug.log_path.display(),
            e
        );
    }
}

/// Initialize console logging at `INFO` (for tests and quick starts)
pub fn init_default() {
    let _ = tracing_subscriber::registry()
        .with(filter_for(Level::INFO))
        .with(fmt::layer())
        .try_init();
}

/// Log a synchronization trace message
#[macro_export]
macro_rules! sync_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "sync", $($arg)*)
    };
}

/// Log a synchronization debug message
#[macro_export]
macro_rules! sync_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "sync", $($arg)*)
    };
}

/// Log a pipeline debug message
#[macro_export]
macro_rules! pipeline_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "pipeline", $($arg)*)
    };
}
