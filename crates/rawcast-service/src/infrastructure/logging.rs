//! Log output setup for the rawcast binaries.
//!
//! Installs a `tracing` subscriber writing to stderr, or to an append-only
//! file when one is configured.  `RUST_LOG` overrides the configured level
//! when it is set and parses.
//!
//! File output goes through `tracing_appender::non_blocking`, so the capture
//! thread never blocks on disk I/O.  The returned [`WorkerGuard`] flushes the
//! buffer on drop and must be held until the process exits.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::{self, writer::BoxMakeWriter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    InvalidFilter(#[from] ParseError),

    #[error("log file path {0} has no file name")]
    InvalidFilePath(PathBuf),

    #[error("cannot open log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: InitError,
    },

    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

/// Installs the global subscriber.
///
/// Returns the flush guard when logging to a file, `None` for stderr.
///
/// # Errors
///
/// Fails if `level` is not a valid filter directive, the log file cannot be
/// opened, or a subscriber was already installed.
pub fn init_logging(level: &str, file: Option<&Path>) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(level)?,
    };

    let (writer, ansi, guard) = match file {
        Some(path) => {
            let (non_blocking, guard) = file_writer(path)?;
            (BoxMakeWriter::new(non_blocking), false, Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), true, None),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_target(true),
        )
        .with(filter)
        .try_init()?;

    Ok(guard)
}

/// Parses a filter directive such as `"info"` or `"rawcast_service=debug,warn"`.
pub fn level_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    Ok(EnvFilter::try_new(level)?)
}

/// Opens `path` for appending, creating parent directories as needed.
fn file_writer(path: &Path) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| LoggingError::InvalidFilePath(path.to_path_buf()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(dir)
        .map_err(|source| LoggingError::File {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter_accepts_plain_level_and_directives() {
        assert!(level_filter("info").is_ok());
        assert!(level_filter("rawcast_service=debug,warn").is_ok());
    }

    #[test]
    fn test_level_filter_rejects_garbage() {
        let result = level_filter("rawcast=notalevel");

        assert!(matches!(result, Err(LoggingError::InvalidFilter(_))));
    }

    #[test]
    fn test_file_writer_creates_missing_parent_directories() {
        // Arrange
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logs").join("rawcast.log");

        // Act
        let result = file_writer(&path);

        // Assert
        assert!(result.is_ok());
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn test_file_writer_fails_when_parent_is_a_file() {
        // Arrange
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        // Act
        let result = file_writer(&blocker.join("rawcast.log"));

        // Assert
        assert!(matches!(result, Err(LoggingError::File { .. })));
    }

    #[test]
    fn test_file_writer_rejects_path_without_file_name() {
        let result = file_writer(Path::new(".."));

        assert!(matches!(result, Err(LoggingError::InvalidFilePath(_))));
    }
}
