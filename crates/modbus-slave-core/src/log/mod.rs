//! Byte-level trace logging.
//!
//! Sessions tap every frame they receive and send into an [`io_log::IoLog`].
//! The log is a flat text file, one line per event, that rolls over once it
//! passes a size threshold so a long-running slave cannot fill the disk with
//! a single file.

pub mod io_log;
