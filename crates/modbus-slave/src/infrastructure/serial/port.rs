//! The serial port seam.
//!
//! Line settings (baud rate, parity, stop bits) and the device driver live
//! behind [`SerialPortWrapper`]; the link only needs a byte stream pair and a
//! way to release the port.

use std::fmt;
use std::io::{self, Read, Write};

/// The two directions of an opened port.
pub struct SerialStreams {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
}

impl fmt::Debug for SerialStreams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialStreams").finish_non_exhaustive()
    }
}

/// A configured serial port that can be opened and closed.
pub trait SerialPortWrapper: Send + Sync {
    /// Opens the port with its configured line settings.
    ///
    /// # Errors
    ///
    /// Returns the driver's error when the device is missing or busy.
    fn open(&self) -> io::Result<SerialStreams>;

    /// Releases the port.  A read blocked on the reader must fail or return
    /// end-of-stream once this returns.
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    fn close(&self) -> io::Result<()>;

    /// Device name for logs, e.g. `/dev/ttyUSB0` or `COM3`.
    fn port_name(&self) -> String;
}
