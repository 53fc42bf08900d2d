//! Byte transports.
//!
//! A transport owns one byte stream.  Its [`Transport::run`] task reads the
//! stream until end-of-file or an error and pushes every chunk to the
//! registered [`DataConsumer`].  Once that loop ends the transport is closed
//! and [`Transport::test_input_stream`] starts failing, which is how
//! connection supervisors notice that a peer went away.

use std::io::{self, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

const READ_BUFFER_SIZE: usize = 1024;

/// Back-off used when a non-blocking reader has nothing to offer.
const WOULD_BLOCK_BACKOFF: Duration = Duration::from_millis(10);

/// Receives the bytes read by a [`Transport`].
pub trait DataConsumer: Send + Sync {
    /// A chunk of input, in arrival order.
    fn data(&self, bytes: &[u8]);

    /// The read loop failed with `error` and is about to stop.
    fn handle_io_error(&self, error: &io::Error);
}

/// Read/write primitives plus a liveness probe.
pub trait Transport: Send + Sync {
    /// Writes `bytes` and flushes.
    ///
    /// # Errors
    ///
    /// Returns the underlying write error.
    fn write(&self, bytes: &[u8]) -> io::Result<()>;

    /// Routes all subsequent input to `consumer`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::AlreadyExists`] if a consumer is already attached.
    fn set_consumer(&self, consumer: Arc<dyn DataConsumer>) -> io::Result<()>;

    /// Detaches the current consumer; further input is dropped.
    fn remove_consumer(&self);

    /// Fails once the input stream can no longer be read.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NotConnected`] after the read loop has ended.
    fn test_input_stream(&self) -> io::Result<()>;

    /// The processing task: reads until the stream ends.  Blocks.
    fn run(&self);

    /// Marks the transport closed; the read loop stops at its next wake-up.
    fn close(&self);
}

/// [`Transport`] over any blocking reader/writer pair.
///
/// For a TCP connection the two halves are `try_clone`s of the same stream;
/// for a serial link they are whatever the port wrapper hands out.
pub struct StreamTransport {
    reader: Mutex<Option<Box<dyn Read + Send>>>,
    writer: Mutex<Box<dyn Write + Send>>,
    consumer: Mutex<Option<Arc<dyn DataConsumer>>>,
    open: AtomicBool,
}

impl StreamTransport {
    pub fn new(reader: Box<dyn Read + Send>, writer: Box<dyn Write + Send>) -> Self {
        Self {
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(writer),
            consumer: Mutex::new(None),
            open: AtomicBool::new(true),
        }
    }

    /// Runs [`Transport::run`] on a dedicated, named thread.
    ///
    /// # Errors
    ///
    /// Returns the error from [`std::thread::Builder::spawn`].
    pub fn start(self: &Arc<Self>, thread_name: &str) -> io::Result<JoinHandle<()>> {
        let transport = Arc::clone(self);
        std::thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || transport.run())
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn current_consumer(&self) -> Option<Arc<dyn DataConsumer>> {
        self.consumer.lock().clone()
    }
}

impl Transport for StreamTransport {
    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock();
        writer.write_all(bytes)?;
        writer.flush()
    }

    fn set_consumer(&self, consumer: Arc<dyn DataConsumer>) -> io::Result<()> {
        let mut slot = self.consumer.lock();
        if slot.is_some() {
            return Err(io::Error::new(
                ErrorKind::AlreadyExists,
                "transport already has a consumer",
            ));
        }
        *slot = Some(consumer);
        Ok(())
    }

    fn remove_consumer(&self) {
        self.consumer.lock().take();
    }

    fn test_input_stream(&self) -> io::Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(io::Error::new(ErrorKind::NotConnected, "input stream closed"))
        }
    }

    fn run(&self) {
        let Some(mut reader) = self.reader.lock().take() else {
            debug!("transport read loop already started");
            return;
        };
        let mut buf = [0u8; READ_BUFFER_SIZE];

        while self.is_open() {
            match reader.read(&mut buf) {
                Ok(0) => {
                    debug!("transport input reached end of stream");
                    break;
                }
                Ok(n) => {
                    // Clone out of the lock so the consumer may call back into us.
                    if let Some(consumer) = self.current_consumer() {
                        consumer.data(&buf[..n]);
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted || e.kind() == ErrorKind::TimedOut => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(WOULD_BLOCK_BACKOFF);
                }
                Err(e) => {
                    if self.is_open() {
                        if let Some(consumer) = self.current_consumer() {
                            consumer.handle_io_error(&e);
                        }
                    }
                    debug!("transport read loop stopped: {e}");
                    break;
                }
            }
        }

        self.open.store(false, Ordering::Release);
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
