//! Top-level engine state machine.
//!
//! The `Client` is the explicit handle the rest of the application holds: it
//! combines the connection manager with the message, directory, and draft
//! reconcilers, and routes every input - live-channel frames, HTTP replies,
//! UI commands, timers - through one `handle` entry point in arrival order.

use palaver_core::{
    Connection, ConnectionAction, ConnectionEvent, ConnectionPhase, env::Environment,
};
use palaver_proto::ClientFrame;

use crate::{
    directory::Directory,
    drafts::DraftStore,
    error::ClientError,
    event::{ClientAction, ClientEvent, HttpCall, SyncEvent},
    messages::{MessageLog, PushOutcome},
    storage::{KvStore, keys},
};

/// History page size for the initial load on room entry.
pub(crate) const HISTORY_PAGE: u32 = 50;

/// History page size for scroll-back pagination.
pub(crate) const OLDER_PAGE: u32 = 20;

/// Synchronization engine.
///
/// One instance per client session. All state is owned here and mutated only
/// in response to handled events - no other writers exist, so no locking is
/// needed.
pub struct Client<E: Environment, S: KvStore> {
    env: E,
    kv: S,
    conn: Connection<E>,
    messages: MessageLog<E::Instant>,
    directory: Directory,
    drafts: DraftStore<S, E::Instant>,
    active_room: Option<String>,
    /// Connection epoch, incremented on every channel open. Frames within
    /// one epoch arrive in order; state predating the current epoch is
    /// trusted only after the directory resyncs.
    epoch: u64,
}

impl<E: Environment, S: KvStore> Client<E, S> {
    /// Create an engine over the given environment and durable store.
    ///
    /// A previously stored username (if any) seeds authentication.
    pub fn new(env: E, kv: S) -> Self {
        let stored_username = kv.get(keys::USERNAME).ok().flatten();
        Self {
            conn: Connection::new(env.clone(), stored_username),
            drafts: DraftStore::new(kv.clone()),
            messages: MessageLog::new(),
            directory: Directory::new(),
            active_room: None,
            epoch: 0,
            env,
            kv,
        }
    }

    /// Process one event and return the actions to execute.
    ///
    /// # Errors
    ///
    /// [`ClientError::NoActiveRoom`] for room-scoped commands without a
    /// selected room; [`ClientError::Connection`] for connection misuse.
    pub fn handle(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::Start => self.forward_connection(ConnectionEvent::Start),
            ClientEvent::ChannelOpen => {
                // New epoch: nothing learned before this point is trusted
                // until the directory resyncs.
                self.epoch += 1;
                self.directory.mark_stale();
                self.forward_connection(ConnectionEvent::ChannelOpen)
            },
            ClientEvent::ChannelClosed { reason } => {
                self.forward_connection(ConnectionEvent::ChannelClosed { reason })
            },
            ClientEvent::TimerElapsed => self.forward_connection(ConnectionEvent::TimerElapsed),
            ClientEvent::IdentityFetched { identity } => {
                if let Some(name) = &identity.username {
                    self.remember_username(name);
                }
                self.forward_connection(ConnectionEvent::IdentityFetched {
                    username: identity.username,
                })
            },
            ClientEvent::IdentityFailed { reason } => {
                self.forward_connection(ConnectionEvent::IdentityFailed { reason })
            },

            ClientEvent::ChannelText(text) => Ok(self.on_channel_text(&text)),

            ClientEvent::Tick => {
                let now = self.env.now();
                self.drafts.tick(now, self.env.unix_millis());
                Ok(vec![])
            },

            ClientEvent::SendMessage { content } => self.send_message(&content),
            ClientEvent::SelectRoom { room_id } => Ok(self.select_room(room_id)),
            ClientEvent::LeaveRoom => Ok(self.leave_room()),
            ClientEvent::FetchOlder => self.fetch_older(),
            ClientEvent::CreateRoom { name, description, is_private } => {
                Ok(vec![ClientAction::Http(HttpCall::CreateRoom {
                    name,
                    description,
                    is_private,
                })])
            },
            ClientEvent::InputChanged { text } => {
                if let Some(room) = self.active_room.clone() {
                    self.drafts.input_changed(&room, &text, self.env.now());
                }
                Ok(vec![])
            },
            ClientEvent::SetRoomSort(sort) => {
                self.directory.set_sort(sort);
                Ok(vec![ClientAction::Publish(SyncEvent::RoomsReplaced {
                    count: self.directory.room_count(),
                })])
            },

            ClientEvent::HttpRoomsLoaded { rooms } => {
                let count = rooms.len();
                self.directory.replace_rooms(rooms);
                Ok(vec![ClientAction::Publish(SyncEvent::RoomsReplaced { count })])
            },
            ClientEvent::HttpMessagesLoaded { room_id, messages } => {
                // The fallback endpoint returns oldest-first; reverse into
                // the newest-first page shape history reconciliation expects.
                let page: Vec<_> = messages.into_iter().rev().collect();
                Ok(self.on_history_page(&room_id, &page))
            },
            ClientEvent::HttpMessageSent { message } => Ok(self.on_push(message)),
            ClientEvent::HttpRoomCreated { room } => {
                self.directory.insert_room(room.clone());
                let mut actions =
                    vec![ClientAction::Publish(SyncEvent::RoomUpdated { room: room.clone() })];
                // Auto-enter the room the user just created.
                actions.extend(self.select_room(room.id));
                Ok(actions)
            },
            ClientEvent::HttpFailed { call, reason } => {
                Ok(vec![ClientAction::Log {
                    message: format!("http {call} failed: {reason}"),
                }])
            },
        }
    }

    /// Current connection phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.conn.phase()
    }

    /// Whether the live channel is authenticated.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Connection manager accessor (retry count, last error, user).
    pub fn connection(&self) -> &Connection<E> {
        &self.conn
    }

    /// Currently selected room, if any.
    pub fn active_room(&self) -> Option<&str> {
        self.active_room.as_deref()
    }

    /// Message logs accessor.
    pub fn messages(&self) -> &MessageLog<E::Instant> {
        &self.messages
    }

    /// Room directory and roster accessor.
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Current connection epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Mutable directory access for the dispatcher.
    pub(crate) fn directory_mut(&mut self) -> &mut Directory {
        &mut self.directory
    }

    /// Drop all state scoped to the active room (server-initiated removal).
    pub(crate) fn clear_active_room(&mut self) {
        if let Some(room_id) = self.active_room.take() {
            self.messages.clear(&room_id);
            self.directory.clear_roster();
        }
    }

    /// Decode and dispatch one live-channel frame (dispatch.rs holds the
    /// routing itself).
    fn on_channel_text(&mut self, text: &str) -> Vec<ClientAction> {
        match palaver_proto::decode(text) {
            Ok(frame) => self.dispatch(frame),
            // Decode failures are logged and dropped, never fatal.
            Err(err) => vec![ClientAction::Log { message: format!("dropped frame: {err}") }],
        }
    }

    /// Send a message to the active room, optimistically appending it.
    fn send_message(&mut self, content: &str) -> Result<Vec<ClientAction>, ClientError> {
        if content.trim().is_empty() {
            return Ok(vec![]);
        }
        let room_id = self.active_room.clone().ok_or(ClientError::NoActiveRoom)?;

        let tag = format!("{:016x}", self.env.random_u64());
        let (user_id, username) = match self.conn.user() {
            Some(user) => (user.id.clone(), user.username.clone()),
            None => (String::new(), self.conn.username().to_owned()),
        };
        let entry = self.messages.append_local(
            &room_id,
            &user_id,
            &username,
            content,
            &tag,
            self.env.unix_millis(),
            self.env.now(),
        );

        // The draft described this message; drop its stored entry.
        self.drafts.clear(&room_id);

        let mut actions = vec![ClientAction::Publish(SyncEvent::MessageAppended {
            room_id: room_id.clone(),
            entry,
        })];
        if self.conn.is_connected() {
            actions.push(ClientAction::SendFrame(ClientFrame::SendMessage {
                content: content.to_owned(),
                client_tag: Some(tag),
            }));
        } else {
            actions.push(ClientAction::Http(HttpCall::SendMessage {
                room_id,
                content: content.to_owned(),
                client_tag: tag,
            }));
        }
        Ok(actions)
    }

    /// Switch to a room: flush/load drafts, reset the room's log and roster,
    /// and request fresh history.
    fn select_room(&mut self, room_id: String) -> Vec<ClientAction> {
        if self.active_room.as_deref() == Some(room_id.as_str()) {
            return vec![];
        }

        let mut actions = Vec::new();

        // Outgoing draft flushes before the incoming one loads.
        if let Some(text) = self.drafts.switch(&room_id, self.env.unix_millis()) {
            actions.push(ClientAction::Publish(SyncEvent::DraftLoaded {
                room_id: room_id.clone(),
                text,
            }));
        }

        self.active_room = Some(room_id.clone());
        self.messages.clear(&room_id);
        self.directory.clear_roster();
        if let Some(room) = self.directory.clear_unread(&room_id) {
            actions.push(ClientAction::Publish(SyncEvent::RoomUpdated { room: room.clone() }));
        }

        if self.conn.is_connected() {
            actions.push(ClientAction::SendFrame(ClientFrame::JoinRoom {
                room_id: room_id.clone(),
            }));
            actions.push(ClientAction::SendFrame(ClientFrame::GetMessages {
                room_id,
                limit: HISTORY_PAGE,
                before_id: None,
            }));
        } else {
            // join_room has no request/response equivalent: dropped until
            // reconnection (documented gap - no retry queue exists).
            actions.push(ClientAction::Log {
                message: format!("join_room {room_id} dropped while disconnected"),
            });
            actions.push(ClientAction::Http(HttpCall::FetchMessages { room_id }));
        }
        actions
    }

    /// Leave the active room.
    fn leave_room(&mut self) -> Vec<ClientAction> {
        let Some(room_id) = self.active_room.take() else {
            return vec![];
        };

        self.drafts.flush(self.env.unix_millis());
        self.messages.clear(&room_id);
        self.directory.clear_roster();

        let mut actions = Vec::new();
        if self.conn.is_connected() {
            actions.push(ClientAction::SendFrame(ClientFrame::LeaveRoom {
                room_id: room_id.clone(),
            }));
        } else {
            actions.push(ClientAction::Log {
                message: format!("leave_room {room_id} dropped while disconnected"),
            });
        }
        actions.push(ClientAction::Publish(SyncEvent::RoomLeft { room_id }));
        actions
    }

    /// Request the next older history page for the active room.
    fn fetch_older(&mut self) -> Result<Vec<ClientAction>, ClientError> {
        let room_id = self.active_room.clone().ok_or(ClientError::NoActiveRoom)?;
        let Some(before_id) = self.messages.earliest_id(&room_id).map(str::to_owned) else {
            // Nothing confirmed yet; there is no cursor to page from.
            return Ok(vec![]);
        };

        if self.conn.is_connected() {
            Ok(vec![ClientAction::SendFrame(ClientFrame::GetMessages {
                room_id,
                limit: OLDER_PAGE,
                before_id: Some(before_id),
            })])
        } else {
            // The fallback endpoint has no cursor; the log dedups whatever
            // overlap the refetch returns.
            Ok(vec![ClientAction::Http(HttpCall::FetchMessages { room_id })])
        }
    }

    /// Feed one event into the connection manager and translate its actions.
    pub(crate) fn forward_connection(
        &mut self,
        event: ConnectionEvent,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let actions = self.conn.handle(event)?;
        Ok(actions.into_iter().map(|a| self.translate_connection_action(a)).collect())
    }

    fn translate_connection_action(&self, action: ConnectionAction) -> ClientAction {
        match action {
            ConnectionAction::FetchIdentity => ClientAction::Http(HttpCall::FetchIdentity),
            ConnectionAction::OpenChannel => ClientAction::OpenChannel,
            ConnectionAction::SendFrame(frame) => ClientAction::SendFrame(frame),
            ConnectionAction::StartTimer(delay) => ClientAction::StartTimer(delay),
            ConnectionAction::PhaseChanged(phase) => {
                ClientAction::Publish(SyncEvent::PhaseChanged(phase))
            },
        }
    }

    /// Persist the username for the next session's auth bootstrap.
    pub(crate) fn remember_username(&self, username: &str) {
        if let Err(err) = self.kv.put(keys::USERNAME, username) {
            tracing::debug!(%err, "username persist failed");
        }
    }

    /// Persist the authenticated identity (username and key material).
    pub(crate) fn remember_identity(&self, user: &palaver_proto::User) {
        self.remember_username(&user.username);
        if let Some(public_key) = &user.public_key {
            if let Err(err) = self.kv.put(keys::PUBLIC_KEY, public_key) {
                tracing::debug!(%err, "public key persist failed");
            }
        }
    }

    /// Apply a confirmed message (live push or HTTP send reply).
    pub(crate) fn on_push(&mut self, message: palaver_proto::Message) -> Vec<ClientAction> {
        let is_active = self.active_room.as_deref() == Some(message.room_id.as_str());
        let room_id = message.room_id.clone();
        let timestamp = message.timestamp;

        let mut actions = Vec::new();
        match self.messages.apply_push(message, self.env.now()) {
            PushOutcome::Confirmed { room_id, id } => {
                actions.push(ClientAction::Publish(SyncEvent::MessageConfirmed { room_id, id }));
            },
            PushOutcome::Appended { room_id, entry } => {
                actions.push(ClientAction::Publish(SyncEvent::MessageAppended {
                    room_id,
                    entry,
                }));
            },
            PushOutcome::Duplicate => {},
        }

        if let Some(room) = self.directory.note_activity(&room_id, timestamp, is_active) {
            actions.push(ClientAction::Publish(SyncEvent::RoomUpdated { room: room.clone() }));
        }
        actions
    }

    /// Apply a newest-first history page.
    pub(crate) fn on_history_page(
        &mut self,
        room_id: &str,
        page: &[palaver_proto::Message],
    ) -> Vec<ClientAction> {
        let count =
            self.messages.apply_history_page(self.active_room.as_deref(), room_id, page);
        if count == 0 {
            return vec![];
        }
        let room_id = if room_id.is_empty() {
            page.first().map_or_else(String::new, |m| m.room_id.clone())
        } else {
            room_id.to_owned()
        };
        vec![ClientAction::Publish(SyncEvent::HistoryPrepended { room_id, count })]
    }
}
