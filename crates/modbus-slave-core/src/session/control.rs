//! Session controller.
//!
//! [`MessageControl`] attaches itself to a transport as its data consumer.
//! Every chunk of input is traced, appended to a buffer and offered to the
//! frame parser until the parser asks for more bytes.  Each complete frame
//! goes to the request handler and the response, if any, is traced and
//! written back on the same transport.
//!
//! The controller never closes the transport itself; whoever owns the
//! underlying socket or port does that.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::log::io_log::IoLog;
use crate::protocol::framing::{FrameError, FrameParser, RequestHandler};
use crate::session::exception::ExceptionHandler;
use crate::session::transport::{DataConsumer, Transport};

/// Error returned when a session cannot be bound.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is already started")]
    AlreadyStarted,
    #[error("failed to attach session to transport: {0}")]
    Attach(#[source] io::Error),
}

/// Binds a transport, a frame parser and a request handler into a running
/// request/response cycle.
pub trait SessionBinder: Send {
    /// Starts processing.  Input arriving after this call is served.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the session is already bound or the
    /// transport refuses the binding.
    fn start(
        &mut self,
        transport: Arc<dyn Transport>,
        parser: Box<dyn FrameParser>,
        handler: Box<dyn RequestHandler>,
    ) -> Result<(), SessionError>;

    /// Detaches from the transport and flushes resources.  Idempotent.
    fn close(&mut self);
}

/// Default [`SessionBinder`].
pub struct MessageControl {
    exception_handler: Arc<dyn ExceptionHandler>,
    io_log: Option<Arc<IoLog>>,
    transport: Option<Arc<dyn Transport>>,
}

impl MessageControl {
    pub fn new(exception_handler: Arc<dyn ExceptionHandler>) -> Self {
        Self {
            exception_handler,
            io_log: None,
            transport: None,
        }
    }

    /// Traces all traffic of this session into `io_log`.
    pub fn with_io_log(mut self, io_log: IoLog) -> Self {
        self.io_log = Some(Arc::new(io_log));
        self
    }

    pub fn set_io_log(&mut self, io_log: Option<IoLog>) {
        self.io_log = io_log.map(Arc::new);
    }

    pub fn io_log(&self) -> Option<&IoLog> {
        self.io_log.as_deref()
    }

    pub fn is_started(&self) -> bool {
        self.transport.is_some()
    }
}

impl SessionBinder for MessageControl {
    fn start(
        &mut self,
        transport: Arc<dyn Transport>,
        parser: Box<dyn FrameParser>,
        handler: Box<dyn RequestHandler>,
    ) -> Result<(), SessionError> {
        if self.transport.is_some() {
            return Err(SessionError::AlreadyStarted);
        }

        let exchange = Arc::new(Exchange {
            transport: Arc::clone(&transport),
            state: Mutex::new(ExchangeState {
                parser,
                handler,
                buffer: Vec::new(),
            }),
            io_log: self.io_log.clone(),
            exception_handler: Arc::clone(&self.exception_handler),
        });
        transport
            .set_consumer(exchange)
            .map_err(SessionError::Attach)?;

        self.transport = Some(transport);
        Ok(())
    }

    fn close(&mut self) {
        // Dropping the consumer breaks the transport <-> exchange cycle.
        if let Some(transport) = self.transport.take() {
            transport.remove_consumer();
            debug!("session closed");
        }
    }
}

impl Drop for MessageControl {
    fn drop(&mut self) {
        self.close();
    }
}

/// The consumer registered on the transport.
struct Exchange {
    transport: Arc<dyn Transport>,
    state: Mutex<ExchangeState>,
    io_log: Option<Arc<IoLog>>,
    exception_handler: Arc<dyn ExceptionHandler>,
}

struct ExchangeState {
    parser: Box<dyn FrameParser>,
    handler: Box<dyn RequestHandler>,
    buffer: Vec<u8>,
}

impl Exchange {
    fn respond(&self, state: &mut ExchangeState, request: &[u8]) {
        match state.handler.handle(request) {
            Ok(Some(response)) => {
                if let Some(log) = &self.io_log {
                    log.record_output(&response);
                }
                if let Err(e) = self.transport.write(&response) {
                    self.exception_handler.received_exception(&e);
                }
            }
            Ok(None) => {}
            Err(e) => self.exception_handler.received_exception(&e),
        }
    }

    fn discard(&self, state: &mut ExchangeState, error: &FrameError) {
        if let Some(log) = &self.io_log {
            log.record_marker(&format!(
                "discarded {} buffered bytes: {error}",
                state.buffer.len()
            ));
        }
        state.buffer.clear();
        self.exception_handler.received_exception(error);
    }
}

impl DataConsumer for Exchange {
    fn data(&self, bytes: &[u8]) {
        if let Some(log) = &self.io_log {
            log.record_input(bytes);
        }

        let mut state = self.state.lock();
        state.buffer.extend_from_slice(bytes);

        loop {
            let parsed = {
                let ExchangeState { parser, buffer, .. } = &mut *state;
                parser.parse(buffer)
            };
            match parsed {
                Ok(None) => break,
                Ok(Some(frame)) if frame.consumed == 0 => {
                    let error = FrameError::Malformed("parser consumed no bytes".to_string());
                    self.discard(&mut state, &error);
                    break;
                }
                Ok(Some(frame)) => {
                    let consumed = frame.consumed.min(state.buffer.len());
                    state.buffer.drain(..consumed);
                    self.respond(&mut state, &frame.payload);
                }
                Err(e) => {
                    self.discard(&mut state, &e);
                    break;
                }
            }
        }
    }

    fn handle_io_error(&self, error: &io::Error) {
        if let Some(log) = &self.io_log {
            log.record_marker(&format!("transport error: {error}"));
        }
        self.exception_handler.received_exception(error);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
