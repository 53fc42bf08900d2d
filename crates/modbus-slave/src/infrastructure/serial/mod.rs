//! Serial slave infrastructure.
//!
//! - **`port`** – the [`port::SerialPortWrapper`] seam through which a
//!   physical (or simulated) port is opened and closed.
//! - **`link`** – [`link::SerialLinkService`], one session over one port.

pub mod link;
pub mod port;
