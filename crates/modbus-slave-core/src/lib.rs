//! # modbus-slave-core
//!
//! Building blocks shared by every Modbus slave transport in this workspace.
//! The crate knows nothing about listening sockets or serial ports; it only
//! defines how a byte stream is turned into request/response traffic and how
//! that traffic is traced to disk.
//!
//! - **`protocol`** – The framing modes a slave can speak and the traits that
//!   plug a concrete wire format in: [`FrameParser`], [`RequestHandler`] and
//!   the [`ProtocolStack`] factory that builds them per connection.
//!
//! - **`session`** – The byte [`Transport`] abstraction (with its reference
//!   [`StreamTransport`] over any `Read`/`Write` pair), the [`SessionBinder`]
//!   contract with its default [`MessageControl`] implementation, and the
//!   [`ExceptionHandler`] sink for non-fatal errors.
//!
//! - **`log`** – [`IoLog`], the append-only trace of raw input/output bytes
//!   that rolls over to `<path>_<epoch-seconds>` once it grows past 10 MiB.

pub mod log;
pub mod protocol;
pub mod session;

pub use log::io_log::{IoLog, DEFAULT_MAX_FILE_SIZE};
pub use protocol::framing::{
    FrameError, FrameParser, FramingMode, ParsedFrame, ProtocolStack, RequestHandler,
};
pub use session::control::{MessageControl, SessionBinder, SessionError};
pub use session::exception::{ExceptionHandler, TracingExceptionHandler};
pub use session::transport::{DataConsumer, StreamTransport, Transport};
