//! Application layer for the slave services.
//!
//! - **`slave_service`** – the [`slave_service::SlaveService`] interface that
//!   the TCP listener and the serial link both implement, the shared
//!   [`slave_service::SlaveError`] type, and the `report` helper that funnels
//!   non-fatal errors into an exception sink.
//!
//! - **`log_target`** – turns a configured log path into the concrete file a
//!   session traces into, and opens it.
//!
//! - **`loopback`** – a protocol stack that echoes every received chunk.
//!   Useful for link checks and used by the `modbus-slave` binary when no
//!   protocol implementation is plugged in.
//!
//! **Dependency rule**: this layer depends on `modbus_slave_core` only; it
//! MUST NOT import `infrastructure`.

pub mod log_target;
pub mod loopback;
pub mod slave_service;
