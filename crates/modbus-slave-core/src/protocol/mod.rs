//! Protocol plug points.
//!
//! The slave services never look inside a frame.  They pick a
//! [`framing::FramingMode`] from configuration and ask a
//! [`framing::ProtocolStack`] for the parser and request handler that
//! implement it.

pub mod framing;
