//! One accepted TCP connection and its supervisor.
//!
//! # Lifecycle
//!
//! ```text
//! Starting ──bind ok──► Running ──probe fails / killed──► Closing ──► Closed
//!     │                                                      ▲
//!     └──────────────── bind or submit failed ───────────────┘
//! ```
//!
//! The supervisor runs on a pool worker.  While `Running` it probes the
//! transport every `poll_interval`; the transport's own read loop runs on a
//! second worker and marks the stream dead when the peer goes away or the
//! socket is shut down by [`ConnectionHandle::kill`].

use std::fmt;
use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use modbus_slave_core::{
    ExceptionHandler, FramingMode, MessageControl, ProtocolStack, SessionBinder, StreamTransport,
    Transport,
};
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::log_target::{open_io_log, TCP_LOG_FILE_NAME};
use crate::application::slave_service::{report, SlaveError};
use crate::infrastructure::network::registry::ConnectionRegistry;
use crate::infrastructure::network::worker_pool::WorkerPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Starting,
    Running,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Identity and socket of one connection.
///
/// Shared between the registry and the supervisor; the registry only ever
/// needs the id and [`ConnectionHandle::kill`].
pub struct ConnectionHandle {
    id: Uuid,
    peer: SocketAddr,
    socket: TcpStream,
    state: Mutex<ConnectionState>,
    killed: AtomicBool,
}

impl ConnectionHandle {
    pub fn new(socket: TcpStream, peer: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            socket,
            state: Mutex::new(ConnectionState::Starting),
            killed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }

    /// Forces the socket closed in both directions.
    ///
    /// Only the first call acts.  A peer that already disconnected is not an
    /// error; any other failure is reported to `sink`.
    pub fn kill(&self, sink: &dyn ExceptionHandler) {
        if self.killed.swap(true, Ordering::AcqRel) {
            return;
        }
        match self.socket.shutdown(Shutdown::Both) {
            Ok(()) => debug!("connection {} ({}) shut down", self.id, self.peer),
            Err(e) if e.kind() == ErrorKind::NotConnected => {}
            Err(source) => report(
                sink,
                SlaveError::Close {
                    what: format!("connection to {}", self.peer),
                    source,
                },
            ),
        }
    }

    fn try_clone_socket(&self) -> Result<TcpStream, SlaveError> {
        self.socket.try_clone().map_err(|source| SlaveError::Init {
            context: format!("duplicate socket of {}", self.peer),
            source,
        })
    }
}

/// Everything a supervisor needs from its listener.
pub struct SupervisorContext {
    pub framing: FramingMode,
    pub log_path: Option<PathBuf>,
    pub poll_interval: Duration,
    pub stack: Arc<dyn ProtocolStack>,
    pub pool: Arc<WorkerPool>,
    pub registry: Arc<ConnectionRegistry>,
    pub sink: Arc<dyn ExceptionHandler>,
}

/// Binds a session to one connection and watches it until it dies.
pub struct ConnectionSupervisor {
    handle: Arc<ConnectionHandle>,
    context: Arc<SupervisorContext>,
}

impl ConnectionSupervisor {
    pub fn new(handle: Arc<ConnectionHandle>, context: Arc<SupervisorContext>) -> Self {
        Self { handle, context }
    }

    /// Runs the whole lifecycle on the calling thread.  Blocks until the
    /// connection is closed.
    pub fn run(self) {
        let (session, transport) = match self.bind() {
            Ok(bound) => bound,
            Err(e) => {
                report(self.context.sink.as_ref(), e);
                self.teardown(None, None);
                return;
            }
        };
        self.handle.set_state(ConnectionState::Running);
        info!("connection {} from {} running", self.handle.id, self.handle.peer);

        while transport.test_input_stream().is_ok() && !self.handle.is_killed() {
            std::thread::sleep(self.context.poll_interval);
        }

        self.teardown(Some(session), Some(transport));
    }

    /// Wraps the socket in a transport, binds a session to it and submits the
    /// transport's read loop to the pool.
    fn bind(&self) -> Result<(MessageControl, Arc<StreamTransport>), SlaveError> {
        let ctx = &self.context;
        let reader = self.handle.try_clone_socket()?;
        let writer = self.handle.try_clone_socket()?;
        let transport = Arc::new(StreamTransport::new(Box::new(reader), Box::new(writer)));

        let parser = ctx.stack.parser(ctx.framing, false);
        let handler = ctx.stack.request_handler(ctx.framing);

        let mut session = MessageControl::new(Arc::clone(&ctx.sink));
        session.set_io_log(open_io_log(
            ctx.log_path.as_deref(),
            TCP_LOG_FILE_NAME,
            ctx.sink.as_ref(),
        ));
        session.start(transport.clone(), parser, handler)?;

        let task = Arc::clone(&transport);
        if let Err(e) = ctx.pool.execute(move || task.run()) {
            session.close();
            return Err(e);
        }
        Ok((session, transport))
    }

    fn teardown(&self, session: Option<MessageControl>, transport: Option<Arc<StreamTransport>>) {
        self.handle.set_state(ConnectionState::Closing);
        if let Some(mut session) = session {
            session.close();
        }
        if let Some(transport) = transport {
            transport.close();
        }
        self.handle.kill(self.context.sink.as_ref());
        self.context.registry.remove(self.handle.id);
        self.handle.set_state(ConnectionState::Closed);
        info!("connection {} from {} closed", self.handle.id, self.handle.peer);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
