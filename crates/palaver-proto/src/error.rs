//! Codec error types.

use thiserror::Error;

/// Errors produced when decoding an inbound frame.
///
/// All decode errors are non-fatal: the dispatcher logs and drops the frame,
/// the connection stays up.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The `type` discriminant is not one this client understands.
    ///
    /// Servers may speak newer protocol revisions; unknown frames are
    /// skipped rather than treated as a protocol violation.
    #[error("unknown frame type: {0}")]
    UnknownFrameType(String),

    /// The frame carries no `type` discriminant at all.
    #[error("frame missing type discriminant")]
    MissingType,

    /// The envelope is recognized but structurally invalid.
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Errors produced when encoding an outbound frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Serialization failed.
    #[error("frame serialization failed: {0}")]
    Serialization(String),
}
