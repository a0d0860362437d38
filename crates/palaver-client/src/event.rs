//! Engine events, actions, and published state changes.

use std::time::Duration;

use palaver_core::ConnectionPhase;
use palaver_proto::{ClientFrame, Identity, Message, Room, User};

use crate::{directory::RoomSort, messages::LogEntry};

/// Events the caller feeds into the engine.
///
/// The caller is responsible for receiving live-channel text, executing HTTP
/// calls, driving time forward via ticks, and forwarding UI commands.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Begin the connection bootstrap.
    Start,

    /// The live channel opened. Starts a new connection epoch.
    ChannelOpen,

    /// The live channel closed or errored.
    ChannelClosed {
        /// Close or error description.
        reason: String,
    },

    /// One raw text frame arrived on the live channel.
    ChannelText(String),

    /// A timer armed by [`ClientAction::StartTimer`] elapsed.
    TimerElapsed,

    /// Periodic tick for debounce housekeeping.
    Tick,

    /// The identity fetch completed.
    IdentityFetched {
        /// The fetched identity.
        identity: Identity,
    },

    /// The identity fetch failed.
    IdentityFailed {
        /// Failure description.
        reason: String,
    },

    /// UI command: send a message to the active room.
    SendMessage {
        /// Message body.
        content: String,
    },

    /// UI command: switch to a room.
    SelectRoom {
        /// Room to enter.
        room_id: String,
    },

    /// UI command: leave the active room.
    LeaveRoom,

    /// UI command: fetch an older history page for the active room. Issued
    /// when the view reaches the top of a non-empty log.
    FetchOlder,

    /// UI command: create a room (request/response only; there is no live
    /// channel equivalent).
    CreateRoom {
        /// Room name.
        name: String,
        /// Room description.
        description: String,
        /// Whether the room is invite-only.
        is_private: bool,
    },

    /// UI command: the message input changed (drives draft persistence).
    InputChanged {
        /// Current input text.
        text: String,
    },

    /// UI command: change the room list sort order.
    SetRoomSort(RoomSort),

    /// HTTP fallback: room directory fetched.
    HttpRoomsLoaded {
        /// Full room list.
        rooms: Vec<Room>,
    },

    /// HTTP fallback: messages fetched for a room, oldest first.
    HttpMessagesLoaded {
        /// Room the messages belong to.
        room_id: String,
        /// Messages, oldest first.
        messages: Vec<Message>,
    },

    /// HTTP fallback: a message send was accepted.
    HttpMessageSent {
        /// The stored message, as confirmed by the server.
        message: Message,
    },

    /// HTTP fallback: a room was created.
    HttpRoomCreated {
        /// The created room.
        room: Room,
    },

    /// An HTTP call failed.
    HttpFailed {
        /// Which call failed.
        call: &'static str,
        /// Failure description.
        reason: String,
    },
}

/// HTTP requests the engine asks the driver to perform.
///
/// Results come back as the corresponding `Http*` [`ClientEvent`]s. There is
/// no ordering guarantee between an HTTP reply and live-channel frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpCall {
    /// `GET /api/identity`.
    FetchIdentity,
    /// `GET /api/rooms`.
    FetchRooms,
    /// `GET /api/messages?room_id=`.
    FetchMessages {
        /// Room to fetch.
        room_id: String,
    },
    /// `POST /api/messages/send`.
    SendMessage {
        /// Target room.
        room_id: String,
        /// Message body.
        content: String,
        /// Correlation tag for matching the optimistic entry.
        client_tag: String,
    },
    /// `POST /api/rooms/create`.
    CreateRoom {
        /// Room name.
        name: String,
        /// Room description.
        description: String,
        /// Whether the room is invite-only.
        is_private: bool,
    },
}

/// Actions the engine produces for the caller to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    /// Send this frame on the live channel.
    SendFrame(ClientFrame),

    /// Perform this HTTP call.
    Http(HttpCall),

    /// Open the live channel.
    OpenChannel,

    /// Arm a one-shot timer; feed [`ClientEvent::TimerElapsed`] when it
    /// fires.
    StartTimer(Duration),

    /// Publish a state change to subscribers.
    Publish(SyncEvent),

    /// Log message for debugging.
    Log {
        /// Log message.
        message: String,
    },
}

/// Typed state-change notifications published by the reconcilers.
///
/// External collaborators (the rendering layer, the settings panel)
/// subscribe to these rather than wiring callbacks into the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The connection phase changed.
    PhaseChanged(ConnectionPhase),

    /// A message was appended to a room's log.
    MessageAppended {
        /// Room the entry was appended to.
        room_id: String,
        /// The appended entry.
        entry: LogEntry,
    },

    /// A pending message was confirmed in place.
    MessageConfirmed {
        /// Room holding the entry.
        room_id: String,
        /// The confirmed server-assigned id.
        id: String,
    },

    /// A history page was prepended to a room's log.
    HistoryPrepended {
        /// Room that grew.
        room_id: String,
        /// Number of entries inserted.
        count: usize,
    },

    /// The room directory was replaced by a snapshot.
    RoomsReplaced {
        /// Number of rooms in the snapshot.
        count: usize,
    },

    /// One room was added or updated.
    RoomUpdated {
        /// The room after the update.
        room: Room,
    },

    /// This client left (or was removed from) a room.
    RoomLeft {
        /// The room that was left.
        room_id: String,
    },

    /// A user joined the active room.
    UserJoined {
        /// The user who joined.
        user: User,
    },

    /// A user left the active room.
    UserLeft {
        /// Id of the user who left.
        user_id: String,
    },

    /// A stored draft was loaded for the newly selected room.
    DraftLoaded {
        /// Room the draft belongs to.
        room_id: String,
        /// Draft text.
        text: String,
    },

    /// The server rejected authentication. The connection manager will
    /// retry; this surfaces the reason to the user.
    AuthRejected {
        /// Rejection reason.
        reason: String,
    },
}
