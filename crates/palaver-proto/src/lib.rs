//! Wire protocol for Palaver
//!
//! Frame types and codec for the chat protocol. A frame is one JSON text
//! message exchanged over the live channel, tagged by a `type` discriminant
//! that selects the payload shape.
//!
//! The codec is stateless: [`decode`] maps raw text to a typed
//! [`ServerFrame`], [`encode`] maps a [`ClientFrame`] back to text. Neither
//! touches any state, so the same functions serve the live channel and tests.
//!
//! # Frame validation
//!
//! The frame envelope is a closed tagged union: an unrecognized discriminant
//! is [`DecodeError::UnknownFrameType`] and a structurally broken envelope is
//! [`DecodeError::Malformed`]. Both are non-fatal to the caller. Entity
//! payloads ([`Message`], [`Room`], [`User`]) decode defensively instead:
//! missing inner fields default rather than reject, because dropping a
//! message over a missing username would leave an unexplained gap in the
//! room's log.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod frame;
mod types;

pub use error::{DecodeError, EncodeError};
pub use frame::{ClientFrame, ServerFrame, decode, encode};
pub use types::{Identity, Message, Room, User, UserStatus};
