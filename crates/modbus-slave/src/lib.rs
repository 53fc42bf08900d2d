//! modbus-slave library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! ```text
//! application/      SlaveService trait, SlaveError, log-target resolution,
//!                   loopback protocol stack
//! infrastructure/
//!   network/        ListenerService, ConnectionSupervisor, ConnectionRegistry,
//!                   WorkerPool
//!   serial/         SerialLinkService, SerialPortWrapper
//!   storage/        TOML configuration
//! ```

pub mod application;
pub mod infrastructure;

pub use application::slave_service::{SlaveError, SlaveService};
pub use infrastructure::network::listener::{ListenerService, TcpSlaveConfig};
pub use infrastructure::serial::link::SerialLinkService;
