//! Inbound frame dispatch.
//!
//! The single entry point for decoded server frames. Routes each frame to
//! exactly one reconciler, synchronously, in arrival order; it holds no
//! state of its own. Downstream reconcilers may therefore assume in-order
//! delivery within one connection epoch.

use palaver_core::{ConnectionEvent, env::Environment};
use palaver_proto::ServerFrame;

use crate::{
    client::Client,
    event::{ClientAction, SyncEvent},
    storage::KvStore,
};

impl<E: Environment, S: KvStore> Client<E, S> {
    /// Route one decoded frame to its reconciler.
    pub(crate) fn dispatch(&mut self, frame: ServerFrame) -> Vec<ClientAction> {
        match frame {
            ServerFrame::AuthResponse { success, user, error } => {
                self.on_auth_response(success, user, error)
            },

            ServerFrame::Message { message } => self.on_push(message),

            ServerFrame::MessageHistory { room_id, messages } => {
                self.on_history_page(&room_id, &messages)
            },

            ServerFrame::RoomJoined { room } => {
                // A directory delta like any other: not trusted between a
                // reconnect and the fresh snapshot. The post-auth room list
                // covers the room anyway.
                if self.directory_mut().upsert_room(room.clone()) {
                    vec![ClientAction::Publish(SyncEvent::RoomUpdated { room })]
                } else {
                    vec![]
                }
            },

            ServerFrame::RoomLeft { room_id } => {
                if self.active_room() == Some(room_id.as_str()) {
                    // Server-initiated removal: drop local room state the
                    // same way an explicit leave would.
                    self.clear_active_room();
                }
                vec![ClientAction::Publish(SyncEvent::RoomLeft { room_id })]
            },

            ServerFrame::RoomList { rooms } => {
                let count = rooms.len();
                self.directory_mut().replace_rooms(rooms);
                vec![ClientAction::Publish(SyncEvent::RoomsReplaced { count })]
            },

            ServerFrame::UserJoined { user } => {
                if self.active_room().is_none() {
                    // Roster is scoped to the joined room; without one the
                    // delta has nothing to attach to.
                    return vec![];
                }
                self.directory_mut().upsert_user(user.clone());
                vec![ClientAction::Publish(SyncEvent::UserJoined { user })]
            },

            ServerFrame::UserLeft { user_id } => {
                if self.directory_mut().remove_user(&user_id) {
                    vec![ClientAction::Publish(SyncEvent::UserLeft { user_id })]
                } else {
                    vec![]
                }
            },
        }
    }

    /// Handle the authentication reply.
    fn on_auth_response(
        &mut self,
        success: bool,
        user: Option<palaver_proto::User>,
        error: Option<String>,
    ) -> Vec<ClientAction> {
        if success {
            if let Some(user) = user {
                self.remember_identity(&user);
                return self.forward_auth(ConnectionEvent::AuthSucceeded { user });
            }
            // No user means the handshake cannot complete; route through
            // the failure path so the retry timer arms.
            return self.forward_auth(ConnectionEvent::AuthFailed {
                reason: "auth_response missing user".into(),
            });
        }

        let reason = error.unwrap_or_else(|| "authentication rejected".into());
        let mut actions =
            vec![ClientAction::Publish(SyncEvent::AuthRejected { reason: reason.clone() })];
        actions.extend(self.forward_auth(ConnectionEvent::AuthFailed { reason }));
        actions
    }

    /// Feed an auth outcome to the connection manager, absorbing stale-state
    /// errors (an auth reply can outlive its connection).
    fn forward_auth(&mut self, event: ConnectionEvent) -> Vec<ClientAction> {
        match self.forward_connection(event) {
            Ok(actions) => actions,
            Err(err) => vec![ClientAction::Log { message: format!("stale auth reply: {err}") }],
        }
    }
}
