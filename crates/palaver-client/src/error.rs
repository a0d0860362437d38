//! Engine error types.

use thiserror::Error;

/// Errors from the synchronization engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// A room-scoped command was issued with no room selected.
    #[error("no active room")]
    NoActiveRoom,

    /// Connection state machine rejected the event.
    #[error(transparent)]
    Connection(#[from] palaver_core::ConnectionError),
}

/// Errors from the durable key-value store.
///
/// Callers treat the store as best-effort: read and write failures degrade
/// to "no draft / no stored identity" rather than propagating.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Underlying storage access failed.
    #[error("storage access failed: {0}")]
    Io(String),

    /// Stored data could not be decoded.
    #[error("stored data corrupt: {0}")]
    Corrupt(String),
}
