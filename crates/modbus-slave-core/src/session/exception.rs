//! Sink for non-fatal errors.

use std::error::Error;

use tracing::warn;

/// Receives errors that are reported instead of propagated: accept failures,
/// connection teardown problems, pool shutdown timeouts, frame errors.
///
/// Implementations must not block and must not panic.
pub trait ExceptionHandler: Send + Sync {
    /// Called once per reported error.
    fn received_exception(&self, error: &(dyn Error + 'static));
}

/// Default sink: logs each error at `warn` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingExceptionHandler;

impl ExceptionHandler for TracingExceptionHandler {
    fn received_exception(&self, error: &(dyn Error + 'static)) {
        warn!("{error}");
    }
}
