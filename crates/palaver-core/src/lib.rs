//! Core connection lifecycle for Palaver
//!
//! Sans-IO building blocks shared by the synchronization engine: the
//! [`Connection`] state machine that owns the live channel's lifecycle, the
//! [`RetryPolicy`] governing reconnect pacing, and the [`env::Environment`]
//! abstraction that decouples all of it from wall clocks and entropy so the
//! same code runs in production and in deterministic tests.
//!
//! # Architecture
//!
//! The connection manager follows the action pattern: it consumes
//! [`ConnectionEvent`]s and returns [`ConnectionAction`]s for the driver to
//! execute. It performs no I/O itself - opening the channel, fetching the
//! identity, and arming retry timers are all actions handed back to the
//! caller.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod connection;
pub mod env;
mod error;
mod retry;

pub use connection::{Connection, ConnectionAction, ConnectionEvent, ConnectionPhase};
pub use error::ConnectionError;
pub use retry::RetryPolicy;
