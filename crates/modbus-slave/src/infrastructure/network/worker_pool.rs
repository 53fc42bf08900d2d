//! Growable pool of blocking workers.
//!
//! Built on tokio's blocking-thread pool: threads are spawned on demand up to
//! `max_workers`, idle ones are reclaimed after `keep_alive`, and shutdown
//! waits a bounded time for busy workers.  No async task ever runs on it, so
//! a current-thread runtime is enough and no async worker thread is spawned.
//! Jobs submitted while all `max_workers` threads are busy wait in tokio's
//! queue; callers that must not wait bound their submissions themselves.
//!
//! The pool can be restarted after a shutdown.  A job submitted while the
//! pool is down is refused with [`SlaveError::PoolShutdown`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

use crate::application::slave_service::SlaveError;

/// How long an idle worker lingers before its thread exits.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

pub struct WorkerPool {
    name: String,
    max_workers: usize,
    keep_alive: Duration,
    runtime: Mutex<Option<Runtime>>,
    active: Arc<AtomicUsize>,
}

/// Counts one submitted job until it finishes or is dropped unrun.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, max_workers: usize, keep_alive: Duration) -> Self {
        Self {
            name: name.into(),
            max_workers: max_workers.max(1),
            keep_alive,
            runtime: Mutex::new(None),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates the underlying thread pool if it is not running.
    ///
    /// # Errors
    ///
    /// Returns [`SlaveError::Pool`] when the OS refuses to create it.
    pub fn start(&self) -> Result<(), SlaveError> {
        let mut slot = self.runtime.lock();
        if slot.is_some() {
            return Ok(());
        }
        let runtime = Builder::new_current_thread()
            .max_blocking_threads(self.max_workers)
            .thread_keep_alive(self.keep_alive)
            .thread_name(format!("{}-worker", self.name))
            .build()
            .map_err(SlaveError::Pool)?;
        debug!(
            "worker pool '{}' started (max {} workers)",
            self.name, self.max_workers
        );
        *slot = Some(runtime);
        Ok(())
    }

    /// Runs `job` on a pool worker.
    ///
    /// # Errors
    ///
    /// Returns [`SlaveError::PoolShutdown`] if the pool is not running; `job`
    /// is dropped without being run.
    pub fn execute<F>(&self, job: F) -> Result<(), SlaveError>
    where
        F: FnOnce() + Send + 'static,
    {
        let slot = self.runtime.lock();
        let runtime = slot.as_ref().ok_or(SlaveError::PoolShutdown)?;
        let guard = ActiveGuard::new(&self.active);
        runtime.spawn_blocking(move || {
            let _guard = guard;
            job();
        });
        Ok(())
    }

    /// Jobs submitted and not yet finished, queued ones included.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.runtime.lock().is_some()
    }

    /// Refuses new jobs and waits up to `timeout` for running ones.
    ///
    /// Workers still busy after the wait are left to finish on their own.
    ///
    /// # Errors
    ///
    /// Returns [`SlaveError::ShutdownTimeout`] if any job was still running
    /// when the wait expired.
    pub fn shutdown(&self, timeout: Duration) -> Result<(), SlaveError> {
        let Some(runtime) = self.runtime.lock().take() else {
            return Ok(());
        };
        runtime.shutdown_timeout(timeout);

        let remaining = self.active();
        if remaining > 0 {
            return Err(SlaveError::ShutdownTimeout { timeout, remaining });
        }
        info!("worker pool '{}' drained", self.name);
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // The last owner may be one of our own workers; never block here.
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
