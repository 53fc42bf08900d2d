//! Resolution of the configured I/O log path.
//!
//! | Configured value      | Traced into                   |
//! |-----------------------|-------------------------------|
//! | absent or blank       | nothing (logging disabled)    |
//! | existing directory    | `<dir>/<default file name>`   |
//! | anything else         | the path itself (created)     |
//!
//! A log that cannot be opened disables tracing for that one session.  The
//! failure is reported to the exception sink and logged; the session itself
//! still starts.

use std::path::{Path, PathBuf};

use modbus_slave_core::{ExceptionHandler, IoLog};
use tracing::{debug, warn};

use crate::application::slave_service::{report, SlaveError};

/// Default file name inside a log directory for TCP sessions.
pub const TCP_LOG_FILE_NAME: &str = "modbus_tcp_s.log";

/// Default file name inside a log directory for the serial link.
pub const RTU_LOG_FILE_NAME: &str = "modbus_rtu_s.log";

/// Returns the file a session should trace into, or `None` when logging is
/// disabled.
pub fn resolve_log_path(configured: Option<&Path>, default_file_name: &str) -> Option<PathBuf> {
    let path = configured?;
    if path.to_string_lossy().trim().is_empty() {
        return None;
    }
    if path.is_dir() {
        Some(path.join(default_file_name))
    } else {
        Some(path.to_path_buf())
    }
}

/// Resolves and opens the I/O log.
///
/// Missing parent directories and the file itself are created.  Errors are
/// reported to `sink` and yield `None`.
pub fn open_io_log(
    configured: Option<&Path>,
    default_file_name: &str,
    sink: &dyn ExceptionHandler,
) -> Option<IoLog> {
    let path = resolve_log_path(configured, default_file_name)?;
    match IoLog::new(&path) {
        Ok(log) => {
            debug!("tracing session I/O to {}", path.display());
            Some(log)
        }
        Err(source) => {
            warn!("I/O logging disabled: cannot open {}: {source}", path.display());
            report(sink, SlaveError::IoLog { path, source });
            None
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::error::Error;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ExceptionHandler for Recorder {
        fn received_exception(&self, error: &(dyn Error + 'static)) {
            self.0.lock().push(error.to_string());
        }
    }

    #[test]
    fn test_absent_path_disables_logging() {
        assert_eq!(resolve_log_path(None, TCP_LOG_FILE_NAME), None);
    }

    #[test]
    fn test_blank_path_disables_logging() {
        assert_eq!(resolve_log_path(Some(Path::new("")), TCP_LOG_FILE_NAME), None);
        assert_eq!(resolve_log_path(Some(Path::new("   ")), TCP_LOG_FILE_NAME), None);
    }

    #[test]
    fn test_directory_gets_default_file_name() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();

        // Act
        let tcp = resolve_log_path(Some(dir.path()), TCP_LOG_FILE_NAME);
        let rtu = resolve_log_path(Some(dir.path()), RTU_LOG_FILE_NAME);

        // Assert
        assert_eq!(tcp, Some(dir.path().join("modbus_tcp_s.log")));
        assert_eq!(rtu, Some(dir.path().join("modbus_rtu_s.log")));
    }

    #[test]
    fn test_missing_path_is_used_as_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("trace.log");

        assert_eq!(
            resolve_log_path(Some(&path), TCP_LOG_FILE_NAME),
            Some(path.clone())
        );
    }

    #[test]
    fn test_open_io_log_creates_parents_and_file() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("slave.log");
        let sink = Recorder::default();

        // Act
        let log = open_io_log(Some(&path), TCP_LOG_FILE_NAME, &sink);

        // Assert
        assert!(log.is_some());
        assert!(path.is_file());
        assert!(sink.0.lock().is_empty());
    }

    #[test]
    fn test_open_io_log_in_directory_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Recorder::default();

        let log = open_io_log(Some(dir.path()), RTU_LOG_FILE_NAME, &sink).unwrap();
        log.record_marker("hello");

        assert!(dir.path().join(RTU_LOG_FILE_NAME).is_file());
        assert_eq!(log.path(), dir.path().join(RTU_LOG_FILE_NAME).as_path());
    }

    #[test]
    fn test_open_failure_is_reported_and_disables_logging() {
        // Arrange: a regular file where a parent directory is expected.
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let path = blocker.join("slave.log");
        let sink = Recorder::default();

        // Act
        let log = open_io_log(Some(&path), TCP_LOG_FILE_NAME, &sink);

        // Assert
        assert!(log.is_none());
        let reported = sink.0.lock();
        assert_eq!(reported.len(), 1);
        assert!(reported[0].starts_with("cannot open I/O log at"));
    }
}
