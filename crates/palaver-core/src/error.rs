//! Error types for the connection lifecycle.

use thiserror::Error;

use crate::connection::ConnectionPhase;

/// Errors from the connection state machine.
///
/// Only caller misuse is an error. Stale or racing inputs (a timer firing
/// after the channel already reopened, a duplicate close notification) are
/// absorbed silently, because the driver cannot avoid producing them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// An operation was requested in a phase that does not permit it.
    #[error("invalid transition: cannot {operation} while {phase:?}")]
    InvalidTransition {
        /// Phase at the time of the request.
        phase: ConnectionPhase,
        /// The requested operation.
        operation: &'static str,
    },
}
