//! Session plumbing: byte transports, the session controller, and the sink for
//! non-fatal errors.
//!
//! # Sub-modules
//!
//! - **`transport`** – [`transport::Transport`] is what a session reads from
//!   and writes to.  [`transport::StreamTransport`] implements it over any
//!   blocking `Read`/`Write` pair and doubles as the liveness probe used by
//!   connection supervisors.
//!
//! - **`control`** – [`control::SessionBinder`] wires a transport to a frame
//!   parser and a request handler.  [`control::MessageControl`] is the
//!   default binder: it buffers input, cuts frames, answers them and taps the
//!   I/O log.
//!
//! - **`exception`** – [`exception::ExceptionHandler`] receives every error
//!   that must not abort the caller.

pub mod control;
pub mod exception;
pub mod transport;
