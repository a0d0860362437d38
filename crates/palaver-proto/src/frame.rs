//! Frame envelopes and the codec itself.
//!
//! Frames are internally tagged JSON: the `type` field selects the variant.
//! [`ClientFrame`] covers everything this client sends on the live channel,
//! [`ServerFrame`] everything it is prepared to receive. The two sets are
//! disjoint on purpose: a frame shape is either a command or a notification,
//! never both.

use serde::{Deserialize, Serialize};

use crate::{
    error::{DecodeError, EncodeError},
    types::{Message, Room, User},
};

/// Frames sent from client to server over the live channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Authenticate the connection with a username.
    Auth {
        /// Username to authenticate as (`Anonymous` if none is stored).
        username: String,
    },

    /// Send a message to the currently joined room.
    SendMessage {
        /// Message body.
        content: String,
        /// Correlation token for matching the confirming broadcast.
        #[serde(skip_serializing_if = "Option::is_none")]
        client_tag: Option<String>,
    },

    /// Request a page of message history.
    GetMessages {
        /// Room to fetch from.
        room_id: String,
        /// Maximum number of messages to return.
        limit: u32,
        /// Pagination cursor: only messages older than this id.
        #[serde(skip_serializing_if = "Option::is_none")]
        before_id: Option<String>,
    },

    /// Join a room for real-time updates.
    JoinRoom {
        /// Room to join.
        room_id: String,
    },

    /// Leave the currently joined room.
    LeaveRoom {
        /// Room to leave.
        room_id: String,
    },

    /// Request the full room directory.
    GetRooms,
}

/// Frames received from the server over the live channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Reply to [`ClientFrame::Auth`].
    AuthResponse {
        /// Whether authentication succeeded.
        success: bool,
        /// The authenticated user, on success.
        #[serde(default)]
        user: Option<User>,
        /// Failure reason, on rejection.
        #[serde(default)]
        error: Option<String>,
    },

    /// A message broadcast to the joined room (including echoes of our own
    /// sends).
    Message {
        /// The confirmed message.
        message: Message,
    },

    /// Reply to [`ClientFrame::GetMessages`]; messages arrive newest-first.
    MessageHistory {
        /// Room the page belongs to. Older servers omit this; the
        /// reconciler then falls back to the messages' own `room_id`.
        #[serde(default)]
        room_id: String,
        /// One page of history, newest first.
        #[serde(default)]
        messages: Vec<Message>,
    },

    /// Reply to [`ClientFrame::JoinRoom`].
    RoomJoined {
        /// The joined room.
        room: Room,
    },

    /// Reply to [`ClientFrame::LeaveRoom`].
    RoomLeft {
        /// The room that was left.
        room_id: String,
    },

    /// Reply to [`ClientFrame::GetRooms`]: a full directory snapshot.
    RoomList {
        /// Every room visible to this client.
        #[serde(default)]
        rooms: Vec<Room>,
    },

    /// Unsolicited: a user joined the active room.
    UserJoined {
        /// The user who joined.
        user: User,
    },

    /// Unsolicited: a user left the active room.
    UserLeft {
        /// Id of the user who left.
        user_id: String,
    },
}

/// Discriminants this client understands, used to classify decode failures.
const KNOWN_TYPES: &[&str] = &[
    "auth_response",
    "message",
    "message_history",
    "room_joined",
    "room_left",
    "room_list",
    "user_joined",
    "user_left",
];

/// Minimal view of a frame used to recover the discriminant from text that
/// failed to decode as a [`ServerFrame`].
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Decode one inbound frame.
///
/// # Errors
///
/// - [`DecodeError::UnknownFrameType`] for an unrecognized discriminant
/// - [`DecodeError::MissingType`] when the discriminant is absent
/// - [`DecodeError::Malformed`] for anything else (invalid JSON, wrong
///   payload shape for a known discriminant)
pub fn decode(raw: &str) -> Result<ServerFrame, DecodeError> {
    match serde_json::from_str::<ServerFrame>(raw) {
        Ok(frame) => Ok(frame),
        Err(err) => {
            // Distinguish "frame from the future" from "broken frame": the
            // former is expected across protocol revisions and skipped
            // quietly, the latter is worth a louder log line.
            let Ok(envelope) = serde_json::from_str::<Envelope>(raw) else {
                return Err(DecodeError::Malformed(err.to_string()));
            };
            match envelope.kind {
                Some(kind) if !KNOWN_TYPES.contains(&kind.as_str()) => {
                    Err(DecodeError::UnknownFrameType(kind))
                },
                Some(_) => Err(DecodeError::Malformed(err.to_string())),
                None => Err(DecodeError::MissingType),
            }
        },
    }
}

/// Encode one outbound frame as JSON text.
pub fn encode(frame: &ClientFrame) -> Result<String, EncodeError> {
    serde_json::to_string(frame).map_err(|e| EncodeError::Serialization(e.to_string()))
}
