//! TCP slave: accept loop and ordered shutdown.
//!
//! This module is responsible for:
//!
//! 1. Binding the listening socket on the configured address.
//! 2. Accepting connections until [`ListenerService::stop`] closes the socket.
//! 3. Registering each connection, then handing its supervisor to the worker
//!    pool.
//! 4. Shutting down in a fixed order: listener first so nothing new gets in,
//!    then every live connection, then the pool with a bounded wait.
//!
//! `start()` blocks the calling thread for as long as the service runs.  The
//! listening socket is non-blocking and polled so that `stop()`, called from
//! any other thread, can take it away between two polls.

use std::io::{self, ErrorKind};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use modbus_slave_core::{ExceptionHandler, FramingMode, ProtocolStack, TracingExceptionHandler};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::application::slave_service::{report, SlaveError, SlaveService};
use crate::infrastructure::network::connection::{
    ConnectionHandle, ConnectionSupervisor, SupervisorContext,
};
use crate::infrastructure::network::registry::{ConnectionRegistry, Refusal};
use crate::infrastructure::network::worker_pool::{WorkerPool, DEFAULT_KEEP_ALIVE};

/// Default Modbus TCP port.
pub const DEFAULT_PORT: u16 = 502;

/// How often the accept loop polls the listening socket.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Settings for a [`ListenerService`], fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct TcpSlaveConfig {
    pub bind_address: IpAddr,
    pub port: u16,
    /// `Mbap` or `Encapsulated`.
    pub framing: FramingMode,
    /// File or directory for the per-connection I/O log; `None` disables it.
    pub log_path: Option<PathBuf>,
    /// Liveness probe period of each connection.
    pub poll_interval: Duration,
    /// Bound on the pool drain during `stop()`.
    pub shutdown_timeout: Duration,
    /// Upper bound on pool threads.  Each connection needs two, so at most
    /// `max_workers / 2` connections are admitted.
    pub max_workers: usize,
    /// Connections beyond this are closed right after accept.  The worker
    /// bound applies as well; the lower of the two wins.
    pub max_connections: Option<usize>,
}

impl Default for TcpSlaveConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            framing: FramingMode::Mbap,
            log_path: None,
            poll_interval: Duration::from_millis(500),
            shutdown_timeout: Duration::from_secs(3),
            max_workers: 512,
            max_connections: None,
        }
    }
}

impl TcpSlaveConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Most connections served at once.
    ///
    /// A connection occupies one worker for its supervisor and one for its
    /// transport read loop.  The pool queues jobs beyond `max_workers`
    /// instead of refusing them, and a connection whose read loop is queued
    /// would never be served, so admission stops at half the pool.
    pub fn connection_limit(&self) -> usize {
        let by_workers = (self.max_workers / 2).max(1);
        match self.max_connections {
            Some(limit) => limit.min(by_workers),
            None => by_workers,
        }
    }
}

/// Multi-connection Modbus TCP slave.
pub struct ListenerService {
    config: TcpSlaveConfig,
    context: Arc<SupervisorContext>,
    listener: Mutex<Option<TcpListener>>,
    local_addr: Mutex<Option<SocketAddr>>,
    /// Bumped on every start and stop; an accept loop exits once it no
    /// longer matches the value it started with.
    generation: AtomicU64,
}

impl ListenerService {
    pub fn new(config: TcpSlaveConfig, stack: Arc<dyn ProtocolStack>) -> Self {
        let context = Arc::new(SupervisorContext {
            framing: config.framing,
            log_path: config.log_path.clone(),
            poll_interval: config.poll_interval,
            stack,
            pool: Arc::new(WorkerPool::new(
                "modbus-tcp",
                config.max_workers,
                DEFAULT_KEEP_ALIVE,
            )),
            registry: Arc::new(ConnectionRegistry::new()),
            sink: Arc::new(TracingExceptionHandler),
        });
        Self {
            config,
            context,
            listener: Mutex::new(None),
            local_addr: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Routes non-fatal errors to `sink` instead of the `tracing` default.
    pub fn with_exception_handler(mut self, sink: Arc<dyn ExceptionHandler>) -> Self {
        let ctx = &self.context;
        self.context = Arc::new(SupervisorContext {
            framing: ctx.framing,
            log_path: ctx.log_path.clone(),
            poll_interval: ctx.poll_interval,
            stack: Arc::clone(&ctx.stack),
            pool: Arc::clone(&ctx.pool),
            registry: Arc::clone(&ctx.registry),
            sink,
        });
        self
    }

    pub fn config(&self) -> &TcpSlaveConfig {
        &self.config
    }

    /// The bound address while running, `None` otherwise.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn connection_count(&self) -> usize {
        self.context.registry.len()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.context.registry
    }

    fn sink(&self) -> &dyn ExceptionHandler {
        self.context.sink.as_ref()
    }

    /// Binds the socket and prepares the pool; returns the generation the
    /// accept loop belongs to.
    fn open(&self) -> Result<u64, SlaveError> {
        let mut slot = self.listener.lock();
        if slot.is_some() {
            return Err(SlaveError::AlreadyRunning);
        }

        let addr = self.config.socket_addr();
        if !self.config.framing.is_stream() {
            return Err(SlaveError::Init {
                context: format!("listener on {addr}"),
                source: io::Error::new(
                    ErrorKind::InvalidInput,
                    format!("{} framing cannot be served over TCP", self.config.framing),
                ),
            });
        }
        let listener =
            TcpListener::bind(addr).map_err(|source| SlaveError::BindFailed { addr, source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| SlaveError::Init {
                context: format!("configure listener on {addr}"),
                source,
            })?;
        self.context.pool.start()?;
        self.context.registry.reopen();

        let bound = listener.local_addr().unwrap_or(addr);
        *self.local_addr.lock() = Some(bound);
        *slot = Some(listener);
        info!(
            "Modbus TCP slave listening on {bound} ({} framing)",
            self.config.framing
        );
        Ok(self.generation.fetch_add(1, Ordering::AcqRel) + 1)
    }

    fn accept_loop(&self, generation: u64) {
        loop {
            let accepted = {
                let slot = self.listener.lock();
                match slot.as_ref() {
                    Some(listener) if self.generation.load(Ordering::Acquire) == generation => {
                        listener.accept()
                    }
                    _ => break,
                }
            };

            match accepted {
                Ok((stream, peer)) => self.admit(stream, peer),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    // Transient (e.g. out of descriptors); keep serving.
                    report(self.sink(), SlaveError::Accept(e));
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }
        debug!("accept loop (generation {generation}) ended");
    }

    /// Registers the accepted connection, then submits its supervisor.
    fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(source) = stream.set_nonblocking(false) {
            report(
                self.sink(),
                SlaveError::Init {
                    context: format!("configure socket of {peer}"),
                    source,
                },
            );
            return;
        }

        let handle = Arc::new(ConnectionHandle::new(stream, peer));
        let registry = &self.context.registry;
        match registry.add(Arc::clone(&handle), Some(self.config.connection_limit())) {
            Ok(()) => {}
            Err(Refusal::Full(limit)) => {
                handle.kill(self.sink());
                report(self.sink(), SlaveError::ConnectionLimit { limit, peer });
                return;
            }
            Err(Refusal::Sealed) => {
                debug!("refusing {peer}: service is stopping");
                handle.kill(self.sink());
                return;
            }
        }
        debug!("accepted connection {} from {peer}", handle.id());

        let supervisor = ConnectionSupervisor::new(Arc::clone(&handle), Arc::clone(&self.context));
        if let Err(e) = self.context.pool.execute(move || supervisor.run()) {
            self.abandon(&handle, e);
        }
    }

    /// Drops a registered connection whose supervisor could not be submitted.
    ///
    /// A sealed registry means `stop()` won the race with this admission and
    /// has already closed the socket, so the error is expected.
    fn abandon(&self, handle: &ConnectionHandle, error: SlaveError) {
        let registry = &self.context.registry;
        handle.kill(self.sink());
        registry.remove(handle.id());
        if registry.is_sealed() {
            debug!("dropping {}: service stopped before it was served", handle.peer());
        } else {
            report(self.sink(), error);
        }
    }
}

impl SlaveService for ListenerService {
    /// Binds and serves until [`ListenerService::stop`] is called.
    ///
    /// # Errors
    ///
    /// - [`SlaveError::AlreadyRunning`] if the service is already serving.
    /// - [`SlaveError::BindFailed`] if the address cannot be bound.
    /// - [`SlaveError::Init`] or [`SlaveError::Pool`] if the socket or the
    ///   pool cannot be set up.
    fn start(&self) -> Result<(), SlaveError> {
        let generation = self.open()?;
        self.accept_loop(generation);
        Ok(())
    }

    fn stop(&self) {
        // 1. Listener: dropping it closes the socket.  A close error cannot be
        //    observed through `TcpListener`, so there is nothing to report.
        let listener = {
            let mut slot = self.listener.lock();
            self.generation.fetch_add(1, Ordering::AcqRel);
            *self.local_addr.lock() = None;
            slot.take()
        };
        if let Some(listener) = listener {
            drop(listener);
            info!("Modbus TCP slave stopped listening");
        }

        // 2. Connections.
        let killed = self.context.registry.drain_and_seal(self.sink());
        if killed > 0 {
            info!("closed {killed} live connection(s)");
        }

        // 3. Pool.
        if let Err(e) = self.context.pool.shutdown(self.config.shutdown_timeout) {
            report(self.sink(), e);
        }
    }

    fn exception_handler(&self) -> Arc<dyn ExceptionHandler> {
        Arc::clone(&self.context.sink)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
