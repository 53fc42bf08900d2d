//! Rotating I/O trace log.
//!
//! Each call appends exactly one line and flushes it:
//!
//! ```text
//! 2024/05/01 12:00:00.123 I 01030000000a
//! 2024/05/01 12:00:00.131 O 010314000000000000000000000000000000000000
//! 2024/05/01 12:00:01.002 connection closed
//! ```
//!
//! `I` marks bytes received from the peer, `O` bytes sent to it, and any other
//! text is a free-form marker.
//!
//! # Rollover
//!
//! Before every append the current size is compared against the threshold
//! ([`DEFAULT_MAX_FILE_SIZE`] unless overridden).  Once the file is larger, the
//! handle is closed, the file is renamed to `<path>_<epoch-seconds>` and a new
//! empty file is opened at the original path.  Rolled files are never touched
//! again; pruning them is left to the operator.

use std::ffi::OsString;
use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Size in bytes past which the log file is rolled over (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.3f";

/// Append-only byte trace with size-triggered rollover.
///
/// All methods take `&self`; writes are serialized by an internal mutex.  A
/// single instance is meant to be owned by one session.
#[derive(Debug)]
pub struct IoLog {
    path: PathBuf,
    max_size: u64,
    state: Mutex<LogState>,
}

#[derive(Debug)]
struct LogState {
    out: Option<File>,
    size: u64,
}

impl IoLog {
    /// Opens (or creates) the log file at `path` in append mode.
    ///
    /// Missing parent directories are created.  `path` must name a file; a
    /// directory path has to be resolved to a concrete filename by the caller.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the directories or the file cannot
    /// be created, or if `path` is an existing directory.
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let out = open_append(&path)?;
        let size = out.metadata()?.len();

        Ok(Self {
            path,
            max_size: DEFAULT_MAX_FILE_SIZE,
            state: Mutex::new(LogState {
                out: Some(out),
                size,
            }),
        })
    }

    /// Overrides the rollover threshold.
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Path of the active log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the active log file in bytes.
    pub fn size(&self) -> u64 {
        self.state.lock().size
    }

    /// Records bytes received from the peer.
    pub fn record_input(&self, bytes: &[u8]) {
        self.append_line(&format!("I {}", hex(bytes)));
    }

    /// Records bytes sent to the peer.
    pub fn record_output(&self, bytes: &[u8]) {
        self.append_line(&format!("O {}", hex(bytes)));
    }

    /// Records a free-text marker.
    pub fn record_marker(&self, text: &str) {
        self.append_line(text);
    }

    fn append_line(&self, body: &str) {
        let mut state = self.state.lock();
        self.size_check(&mut state);

        let line = format!(
            "{} {}\n",
            chrono::Local::now().format(TIMESTAMP_FORMAT),
            body
        );
        let Some(out) = state.out.as_mut() else {
            return;
        };
        match out.write_all(line.as_bytes()).and_then(|()| out.flush()) {
            Ok(()) => state.size += line.len() as u64,
            Err(e) => warn!("I/O log write to {} failed: {e}", self.path.display()),
        }
    }

    fn size_check(&self, state: &mut LogState) {
        if state.size <= self.max_size {
            return;
        }

        // Close before renaming so the handle never follows the rolled file.
        state.out = None;

        let rolled = rolled_path(&self.path, epoch_seconds());
        match fs::rename(&self.path, &rolled) {
            Ok(()) => debug!("I/O log rolled over to {}", rolled.display()),
            Err(e) => warn!(
                "failed to roll I/O log {} to {}: {e}",
                self.path.display(),
                rolled.display()
            ),
        }

        match open_append(&self.path) {
            Ok(out) => {
                state.size = out.metadata().map(|m| m.len()).unwrap_or(0);
                state.out = Some(out);
            }
            Err(e) => warn!("failed to reopen I/O log {}: {e}", self.path.display()),
        }
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Returns `<path>_<secs>`.
fn rolled_path(path: &Path, secs: u64) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(format!("_{secs}"));
    PathBuf::from(name)
}

fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

// ── Tests ─────────────────────────────────────────────────────────────────────
