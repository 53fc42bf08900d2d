//! The interface shared by every slave transport.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use modbus_slave_core::{ExceptionHandler, SessionError};
use thiserror::Error;
use tracing::debug;

/// Error type for slave services.
///
/// Only [`SlaveError::BindFailed`], [`SlaveError::Init`], [`SlaveError::Pool`] and
/// [`SlaveError::AlreadyRunning`] are ever returned from `start()`; every
/// other variant is reported through the service's [`ExceptionHandler`].
#[derive(Debug, Error)]
pub enum SlaveError {
    /// The listening socket could not be bound.
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The transport could not be brought up.
    #[error("initialisation failed ({context}): {source}")]
    Init {
        context: String,
        #[source]
        source: io::Error,
    },

    /// `start()` was called on a service that is already running.
    #[error("service is already running")]
    AlreadyRunning,

    /// `accept()` failed while the listener was still open.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// A connection was refused because the configured limit was reached.
    #[error("connection limit of {limit} reached; refused {peer}")]
    ConnectionLimit { limit: usize, peer: SocketAddr },

    /// Closing a socket or port failed.
    #[error("failed to close {what}: {source}")]
    Close {
        what: String,
        #[source]
        source: io::Error,
    },

    /// The I/O log could not be opened; the session runs without one.
    #[error("cannot open I/O log at {}: {source}", .path.display())]
    IoLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The session could not be bound to its transport.
    #[error("session setup failed: {0}")]
    Session(#[from] SessionError),

    /// The worker pool could not be created.
    #[error("failed to start worker pool: {0}")]
    Pool(#[source] io::Error),

    /// Work was submitted after the pool was shut down.
    #[error("worker pool is shut down")]
    PoolShutdown,

    /// Workers were still busy when the shutdown wait expired.
    #[error("worker pool did not drain within {timeout:?}; {remaining} worker(s) still busy")]
    ShutdownTimeout { timeout: Duration, remaining: usize },
}

/// A slave endpoint: something that can be started, stopped and that funnels
/// its non-fatal errors into one sink.
///
/// `start()` and `stop()` take `&self` so a service can be shared through an
/// `Arc` between the thread that runs it and the thread that stops it.
pub trait SlaveService: Send + Sync {
    /// Brings the service up.
    ///
    /// # Errors
    ///
    /// Returns [`SlaveError`] when the transport cannot be initialised; nothing
    /// is left listening in that case.
    fn start(&self) -> Result<(), SlaveError>;

    /// Tears the service down.  Never fails; problems go to the sink.
    fn stop(&self);

    /// The sink receiving non-fatal errors.
    fn exception_handler(&self) -> Arc<dyn ExceptionHandler>;
}

/// Hands `error` to `sink`.
pub fn report(sink: &dyn ExceptionHandler, error: SlaveError) {
    debug!("reporting: {error}");
    sink.received_exception(&error);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
