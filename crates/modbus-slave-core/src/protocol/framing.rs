//! Framing modes and the parser/handler contracts.

use std::fmt;

use thiserror::Error;

/// Error raised by a [`FrameParser`] or a [`RequestHandler`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The bytes cannot be the start of any valid frame.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// The frame was well formed but its checksum did not match.
    #[error("checksum mismatch")]
    Checksum,
    /// The request could not be served.
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Byte-level encoding convention used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramingMode {
    /// Header-framed TCP: every frame carries a length-prefixed header.
    Mbap,
    /// RTU frames encapsulated in a TCP stream.
    Encapsulated,
    /// RTU frames on a serial line.
    Rtu,
}

impl FramingMode {
    /// Whether this mode can be served over a stream socket.
    pub fn is_stream(self) -> bool {
        matches!(self, Self::Mbap | Self::Encapsulated)
    }

    /// Lowercase name used in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            Self::Mbap => "mbap",
            Self::Encapsulated => "encapsulated",
            Self::Rtu => "rtu",
        }
    }
}

impl fmt::Display for FramingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One request frame cut out of the input buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    /// The complete frame, as handed to the [`RequestHandler`].
    pub payload: Vec<u8>,
    /// How many bytes of the input buffer the frame occupied.
    pub consumed: usize,
}

/// Turns buffered input bytes into request frames.
pub trait FrameParser: Send {
    /// Tries to cut one frame off the front of `buffer`.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] when the buffer can never become a valid
    /// frame; the caller discards the buffered bytes.
    fn parse(&mut self, buffer: &[u8]) -> Result<Option<ParsedFrame>, FrameError>;
}

/// Serves one parsed request.
pub trait RequestHandler: Send {
    /// Produces the wire bytes of the response, or `None` for requests that
    /// are not confirmed (broadcasts).
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] when the request cannot be answered at all.
    fn handle(&mut self, request: &[u8]) -> Result<Option<Vec<u8>>, FrameError>;
}

/// Builds the parser/handler pair for a framing mode.
///
/// One stack is shared by every connection of a service; each connection gets
/// fresh parser and handler instances.
pub trait ProtocolStack: Send + Sync {
    /// A parser for `mode`.  Slaves always pass `master = false`.
    fn parser(&self, mode: FramingMode, master: bool) -> Box<dyn FrameParser>;

    /// A request handler for `mode`.
    fn request_handler(&self, mode: FramingMode) -> Box<dyn RequestHandler>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
