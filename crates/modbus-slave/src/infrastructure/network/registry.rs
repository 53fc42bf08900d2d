//! The set of live TCP connections.
//!
//! The accept loop adds each connection before its supervisor is submitted,
//! the supervisor removes it during teardown, and `stop()` drains it.  One
//! mutex covers all three, so a drain never races an insertion.
//!
//! After [`ConnectionRegistry::drain_and_seal`] the registry refuses new
//! entries until [`ConnectionRegistry::reopen`] is called by the next
//! `start()`.

use std::sync::Arc;

use modbus_slave_core::ExceptionHandler;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::infrastructure::network::connection::ConnectionHandle;

/// Why [`ConnectionRegistry::add`] refused a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    /// The service is stopping.
    Sealed,
    /// The registry already holds the given number of connections.
    Full(usize),
}

#[derive(Default)]
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    connections: Vec<Arc<ConnectionHandle>>,
    sealed: bool,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `connection` unless the registry is sealed or holds `limit`
    /// entries already.
    ///
    /// # Errors
    ///
    /// Returns the [`Refusal`]; the caller owns the refused connection and
    /// must close it.
    pub fn add(
        &self,
        connection: Arc<ConnectionHandle>,
        limit: Option<usize>,
    ) -> Result<(), Refusal> {
        let mut state = self.state.lock();
        if state.sealed {
            return Err(Refusal::Sealed);
        }
        if let Some(limit) = limit {
            if state.connections.len() >= limit {
                return Err(Refusal::Full(limit));
            }
        }
        state.connections.push(connection);
        Ok(())
    }

    /// Removes the connection with `id`; returns whether it was present.
    pub fn remove(&self, id: Uuid) -> bool {
        let mut state = self.state.lock();
        let before = state.connections.len();
        state.connections.retain(|c| c.id() != id);
        state.connections.len() != before
    }

    /// Kills every registered connection, empties the registry and seals it.
    ///
    /// Returns how many connections were killed.
    pub fn drain_and_seal(&self, sink: &dyn ExceptionHandler) -> usize {
        let mut state = self.state.lock();
        state.sealed = true;
        let drained = std::mem::take(&mut state.connections);
        for connection in &drained {
            debug!("killing connection {} ({})", connection.id(), connection.peer());
            connection.kill(sink);
        }
        drained.len()
    }

    /// Accepts insertions again after a drain.
    pub fn reopen(&self) {
        self.state.lock().sealed = false;
    }

    pub fn len(&self) -> usize {
        self.state.lock().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().connections.is_empty()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.state.lock().connections.iter().any(|c| c.id() == id)
    }

    pub fn is_sealed(&self) -> bool {
        self.state.lock().sealed
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
