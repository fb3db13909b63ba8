//! Logging for odometer
//!
//! Everything goes to a daily-rotated file in the XDG state directory
//! (`~/.local/state/odometer/odometer.log.YYYY-MM-DD`). The recorder sits on
//! the input path, so the file writer is non-blocking.

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Prefix of every log file name
pub const LOG_FILE_PREFIX: &str = "odometer.log";

/// Keeps the background log writer alive; pending lines are flushed on drop.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Install the global subscriber, logging under [`Config::state_dir`].
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    init_in(&Config::state_dir(), config)
}

/// Install the global subscriber, logging under `dir`.
///
/// `RUST_LOG` takes precedence over `config.level`.
pub fn init_in(dir: &Path, config: &LoggingConfig) -> Result<LoggingGuard> {
    let (writer, guard) = tracing_appender::non_blocking(file_appender(dir, config.max_files)?);

    tracing_subscriber::registry()
        .with(filter(&config.level))
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {e}")))?;

    tracing::info!(log_dir = %dir.display(), level = %config.level, "Logging initialized");
    Ok(LoggingGuard { _guard: guard })
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn file_appender(dir: &Path, max_files: usize) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(max_files.max(1))
        .build(dir)
        .map_err(|e| Error::Config(format!("cannot create log file in {}: {e}", dir.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_appender_writes_rotated_file() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("state/odometer");

        let mut appender = file_appender(&logs, 0).unwrap();
        appender.write_all(b"hello\n").unwrap();
        appender.flush().unwrap();

        let names: Vec<String> = std::fs::read_dir(&logs)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with(LOG_FILE_PREFIX), "got {names:?}");
    }

    #[test]
    fn test_appender_rejects_file_as_directory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        assert!(file_appender(&blocker.join("logs"), 3).is_err());
    }
}
