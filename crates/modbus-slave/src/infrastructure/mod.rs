//! Infrastructure layer for the slave services.
//!
//! Contains the OS-facing adapters: the TCP listener with its connection
//! supervision, the serial link, and file-system configuration.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `modbus_slave_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod serial;
pub mod storage;
