//! Room and presence reconciler.
//!
//! Holds the room directory and the active room's roster. Both follow the
//! snapshot-plus-deltas shape: a full replace rebuilds the collection, and
//! incremental upserts/removals refine it afterwards.
//!
//! Snapshot discipline: after a reconnect the directory is marked stale and
//! deltas are ignored until the next full snapshot arrives, because a delta
//! must never be applied before the snapshot it logically follows.

use std::collections::HashMap;

use palaver_proto::{Room, User, UserStatus};

/// Sort order exposed for the room list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoomSort {
    /// Alphabetical by name (default).
    #[default]
    Name,
    /// Most recent activity first.
    Activity,
    /// Largest member count first.
    Members,
    /// Highest unread count first.
    Unread,
}

/// Room directory and active-room roster.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    rooms: HashMap<String, Room>,
    roster: HashMap<String, User>,
    sort: RoomSort,
    synced: bool,
}

impl Directory {
    /// Create an empty, unsynced directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a snapshot has been applied since the last reconnect.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Forget snapshot trust. Called when the live channel reopens: state
    /// from the previous connection epoch may not reflect the server.
    pub fn mark_stale(&mut self) {
        self.synced = false;
    }

    /// Apply a full directory snapshot, clearing and rebuilding.
    pub fn replace_rooms(&mut self, rooms: Vec<Room>) {
        self.rooms.clear();
        for room in rooms {
            self.rooms.insert(room.id.clone(), room);
        }
        self.synced = true;
    }

    /// Apply an incremental room delta. Returns `false` (ignored) while the
    /// directory is stale.
    pub fn upsert_room(&mut self, room: Room) -> bool {
        if !self.synced {
            return false;
        }
        self.insert_room(room);
        true
    }

    /// Insert a room unconditionally.
    ///
    /// For authoritative replies to this client's own commands (room
    /// created, room joined), which are trustworthy regardless of snapshot
    /// state.
    pub fn insert_room(&mut self, room: Room) {
        self.rooms.insert(room.id.clone(), room);
    }

    /// Remove a room. Returns `false` while stale or if absent.
    pub fn remove_room(&mut self, room_id: &str) -> bool {
        if !self.synced {
            return false;
        }
        self.rooms.remove(room_id).is_some()
    }

    /// Look up a room by id.
    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// Number of rooms in the directory.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Record message activity: bumps `last_activity`, and increments the
    /// unread count unless the room is the active one. Returns the updated
    /// room, or `None` if the room is unknown.
    pub fn note_activity(
        &mut self,
        room_id: &str,
        timestamp: i64,
        is_active: bool,
    ) -> Option<&Room> {
        let room = self.rooms.get_mut(room_id)?;
        if timestamp > room.last_activity {
            room.last_activity = timestamp;
        }
        if !is_active {
            room.unread_count = room.unread_count.saturating_add(1);
        }
        Some(room)
    }

    /// Reset a room's unread count. Returns the updated room if known.
    pub fn clear_unread(&mut self, room_id: &str) -> Option<&Room> {
        let room = self.rooms.get_mut(room_id)?;
        room.unread_count = 0;
        Some(room)
    }

    /// Select the room sort order.
    pub fn set_sort(&mut self, sort: RoomSort) {
        self.sort = sort;
    }

    /// Current room sort order.
    pub fn sort(&self) -> RoomSort {
        self.sort
    }

    /// Rooms in the selected sort order.
    pub fn sorted_rooms(&self) -> Vec<&Room> {
        let mut rooms: Vec<&Room> = self.rooms.values().collect();
        match self.sort {
            RoomSort::Name => rooms.sort_by(|a, b| a.name.cmp(&b.name)),
            RoomSort::Activity => {
                rooms.sort_by(|a, b| {
                    b.last_activity.cmp(&a.last_activity).then_with(|| a.name.cmp(&b.name))
                });
            },
            RoomSort::Members => {
                rooms.sort_by(|a, b| {
                    b.member_count.cmp(&a.member_count).then_with(|| a.name.cmp(&b.name))
                });
            },
            RoomSort::Unread => {
                rooms.sort_by(|a, b| {
                    b.unread_count.cmp(&a.unread_count).then_with(|| a.name.cmp(&b.name))
                });
            },
        }
        rooms
    }

    /// Replace the active room's roster wholesale.
    pub fn replace_roster(&mut self, users: Vec<User>) {
        self.roster.clear();
        for user in users {
            self.roster.insert(user.id.clone(), user);
        }
    }

    /// Add or update one roster entry.
    pub fn upsert_user(&mut self, user: User) {
        self.roster.insert(user.id.clone(), user);
    }

    /// Remove one roster entry. Returns `false` if absent.
    pub fn remove_user(&mut self, user_id: &str) -> bool {
        self.roster.remove(user_id).is_some()
    }

    /// Drop the whole roster. Called on room switch - the roster is scoped
    /// to the joined room.
    pub fn clear_roster(&mut self) {
        self.roster.clear();
    }

    /// Look up a roster entry by id.
    pub fn user(&self, user_id: &str) -> Option<&User> {
        self.roster.get(user_id)
    }

    /// Roster sorted by status priority, then username.
    pub fn sorted_users(&self) -> Vec<&User> {
        let mut users: Vec<&User> = self.roster.values().collect();
        users.sort_by(|a, b| {
            status_rank(a.status)
                .cmp(&status_rank(b.status))
                .then_with(|| a.username.cmp(&b.username))
        });
        users
    }
}

/// Display priority for presence states: online sorts first, offline last.
fn status_rank(status: UserStatus) -> u8 {
    match status {
        UserStatus::Online => 0,
        UserStatus::Away => 1,
        UserStatus::Busy => 2,
        UserStatus::Offline => 3,
    }
}
