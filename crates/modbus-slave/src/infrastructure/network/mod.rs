//! TCP slave infrastructure.
//!
//! # Sub-modules
//!
//! - **`listener`** – Binds the listening socket, runs the accept loop and
//!   performs the ordered shutdown: listener, then connections, then pool.
//!
//! - **`connection`** – One accepted connection: its handle (id, peer, socket,
//!   state) and the supervisor that binds a session to it and polls its
//!   liveness until the peer goes away or the connection is killed.
//!
//! - **`registry`** – The set of live connections shared by the accept loop,
//!   the supervisors and `stop()`.
//!
//! - **`worker_pool`** – The bounded, growable pool that runs supervisors and
//!   transport read loops.

pub mod connection;
pub mod listener;
pub mod registry;
pub mod worker_pool;
