//! Serial slave: one session over one port.
//!
//! Unlike the TCP listener there is no accept loop, no pool and no liveness
//! probe.  The transport's read loop runs on its own named thread and reports
//! read failures to the session through `DataConsumer::handle_io_error`.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use modbus_slave_core::{
    ExceptionHandler, FramingMode, MessageControl, ProtocolStack, SessionBinder, StreamTransport,
    TracingExceptionHandler, Transport,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::application::log_target::{open_io_log, RTU_LOG_FILE_NAME};
use crate::application::slave_service::{report, SlaveError, SlaveService};
use crate::infrastructure::serial::port::SerialPortWrapper;

/// How long `stop()` waits for the read thread after closing the port.
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

pub struct SerialLinkService {
    port: Arc<dyn SerialPortWrapper>,
    stack: Arc<dyn ProtocolStack>,
    log_path: Option<PathBuf>,
    sink: Arc<dyn ExceptionHandler>,
    link: Mutex<Option<ActiveLink>>,
}

struct ActiveLink {
    session: MessageControl,
    transport: Arc<StreamTransport>,
    reader: JoinHandle<()>,
}

impl SerialLinkService {
    pub fn new(port: Arc<dyn SerialPortWrapper>, stack: Arc<dyn ProtocolStack>) -> Self {
        Self {
            port,
            stack,
            log_path: None,
            sink: Arc::new(TracingExceptionHandler),
            link: Mutex::new(None),
        }
    }

    /// File or directory for the I/O log.
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn with_exception_handler(mut self, sink: Arc<dyn ExceptionHandler>) -> Self {
        self.sink = sink;
        self
    }

    pub fn is_running(&self) -> bool {
        self.link.lock().is_some()
    }

    /// Path of the I/O log of the running session, if any.
    pub fn io_log_path(&self) -> Option<PathBuf> {
        let link = self.link.lock();
        link.as_ref()?
            .session
            .io_log()
            .map(|log| log.path().to_path_buf())
    }

    fn close_port(&self) {
        if let Err(source) = self.port.close() {
            report(
                self.sink.as_ref(),
                SlaveError::Close {
                    what: format!("serial port {}", self.port.port_name()),
                    source,
                },
            );
        }
    }
}

impl SlaveService for SerialLinkService {
    /// Opens the port and starts serving.  Returns once the link is up.
    ///
    /// # Errors
    ///
    /// - [`SlaveError::AlreadyRunning`] if the link is already up.
    /// - [`SlaveError::Init`] if the port cannot be opened or the read
    ///   thread cannot be spawned.
    /// - [`SlaveError::Session`] if the session cannot be bound.
    ///
    /// The port is closed again on every error after it was opened.
    fn start(&self) -> Result<(), SlaveError> {
        let mut slot = self.link.lock();
        if slot.is_some() {
            return Err(SlaveError::AlreadyRunning);
        }

        let name = self.port.port_name();
        let streams = self.port.open().map_err(|source| SlaveError::Init {
            context: format!("open serial port {name}"),
            source,
        })?;
        let transport = Arc::new(StreamTransport::new(streams.reader, streams.writer));

        let mut session = MessageControl::new(Arc::clone(&self.sink));
        session.set_io_log(open_io_log(
            self.log_path.as_deref(),
            RTU_LOG_FILE_NAME,
            self.sink.as_ref(),
        ));
        let parser = self.stack.parser(FramingMode::Rtu, false);
        let handler = self.stack.request_handler(FramingMode::Rtu);
        if let Err(e) = session.start(transport.clone(), parser, handler) {
            self.close_port();
            return Err(e.into());
        }

        let reader = match transport.start(&format!("modbus-rtu-{name}")) {
            Ok(reader) => reader,
            Err(source) => {
                session.close();
                self.close_port();
                return Err(SlaveError::Init {
                    context: format!("spawn reader for {name}"),
                    source,
                });
            }
        };

        info!("Modbus serial slave running on {name}");
        *slot = Some(ActiveLink {
            session,
            transport,
            reader,
        });
        Ok(())
    }

    fn stop(&self) {
        let Some(mut link) = self.link.lock().take() else {
            return;
        };
        link.session.close();
        link.transport.close();
        self.close_port();

        let started = Instant::now();
        while !link.reader.is_finished() && started.elapsed() < JOIN_TIMEOUT {
            std::thread::sleep(Duration::from_millis(10));
        }
        if link.reader.is_finished() {
            if link.reader.join().is_err() {
                warn!("serial reader thread panicked");
            }
        } else {
            debug!("serial reader still blocked after {JOIN_TIMEOUT:?}; detaching it");
        }
        info!("Modbus serial slave on {} stopped", self.port.port_name());
    }

    fn exception_handler(&self) -> Arc<dyn ExceptionHandler> {
        Arc::clone(&self.sink)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
