//! Centralized file-based logging system
//!
//! Writes daily-rolling logs under the configured directory, split by type:
//! - main/ - everything, JSON lines
//! - error/ - WARN and above
//! - ws/ - transport logs (`ws` target)
//!
//! plus a console layer. `RUST_LOG` overrides the configured level.

use crate::infrastructure::config::LoggingConfig;
use std::fs;
use std::path::Path;
use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Subdirectories created under the log directory
const LOG_TYPES: [&str; 3] = ["main", "error", "ws"];

/// Targets routed to the ws log
const WS_TARGETS: [&str; 2] = ["ws", "codec"];

/// Initialize logging
///
/// Returns the appender guards, which must be kept alive for the duration
/// of the program. With `file_output` off only the console layer is set up.
pub fn init_logging(config: &LoggingConfig) -> std::io::Result<Vec<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if !config.file_output {
        // A global subscriber may already be set (tests, embedding apps)
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(console_layer())
            .try_init();
        return Ok(Vec::new());
    }

    let logs_dir = config.directory.as_path();
    for log_type in LOG_TYPES {
        fs::create_dir_all(logs_dir.join(log_type))?;
    }

    let mut guards = Vec::with_capacity(LOG_TYPES.len());

    let (main_appender, main_guard) = create_appender(logs_dir, "main");
    guards.push(main_guard);

    let (error_appender, error_guard) = create_appender(logs_dir, "error");
    guards.push(error_guard);

    let (ws_appender, ws_guard) = create_appender(logs_dir, "ws");
    guards.push(ws_guard);

    let main_layer = tracing_subscriber::fmt::layer()
        .with_writer(main_appender)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json();

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(error_appender)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_filter(tracing_subscriber::filter::LevelFilter::WARN);

    let ws_layer = tracing_subscriber::fmt::layer()
        .with_writer(ws_appender)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            is_ws_target(metadata.target())
        }));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(main_layer)
        .with(error_layer)
        .with(ws_layer)
        .with(console_layer())
        .try_init();

    tracing::info!("Logging initialized, files in {}", logs_dir.display());

    Ok(guards)
}

/// Human-readable console output, built per subscriber stack
fn console_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer().with_target(true).with_level(true)
}

fn is_ws_target(target: &str) -> bool {
    WS_TARGETS.iter().any(|t| target == *t || target.starts_with(&format!("{t}::")))
}

/// Create a daily rolling file appender under `dir/name`
fn create_appender(dir: &Path, name: &str) -> (NonBlocking, WorkerGuard) {
    let appender = RollingFileAppender::new(Rotation::DAILY, dir.join(name), name);
    tracing_appender::non_blocking(appender)
}

/// Log macro helpers for specific log types
#[macro_export]
macro_rules! log_ws {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "ws", $level, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_batcher {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "batcher", $level, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_main {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "main", $level, $($arg)+)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_target_routing() {
        assert!(is_ws_target("ws"));
        assert!(is_ws_target("codec"));
        assert!(is_ws_target("ws::client"));
        assert!(!is_ws_target("batcher"));
        assert!(!is_ws_target("wsx"));
    }

    #[test]
    fn test_console_only_creates_no_files() {
        let dir = std::env::temp_dir().join("tick_feed_logs_console_only");
        let _ = fs::remove_dir_all(&dir);
        let config = LoggingConfig {
            directory: dir.clone(),
            level: "warn".to_string(),
            file_output: false,
        };
        let guards = init_logging(&config).unwrap();
        assert!(guards.is_empty());
        assert!(!dir.exists());
    }

    #[test]
    fn test_file_output_creates_log_dirs() {
        let dir = std::env::temp_dir().join("tick_feed_logs_file_output");
        let _ = fs::remove_dir_all(&dir);
        let config = LoggingConfig {
            directory: dir.clone(),
            level: "info".to_string(),
            file_output: true,
        };
        let guards = init_logging(&config).unwrap();
        assert_eq!(guards.len(), LOG_TYPES.len());
        for log_type in LOG_TYPES {
            assert!(dir.join(log_type).is_dir());
        }
        drop(guards);
        let _ = fs::remove_dir_all(&dir);
    }
}
