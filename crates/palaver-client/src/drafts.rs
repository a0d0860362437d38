//! Per-room draft persistence.
//!
//! Every input change schedules a debounced save of the active room's draft
//! into the durable key-value store. Switching rooms flushes the outgoing
//! room's dirty draft immediately (bypassing the debounce) before the
//! incoming room's stored draft is loaded. A successful send removes the
//! stored entry, not merely the in-memory text - an empty stored draft must
//! not resurrect stale text after a storage-load race.
//!
//! All store I/O is fire-and-forget: failures are logged at debug level and
//! the draft simply behaves as absent.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::{KvStore, keys};

/// Quiet period after the last keystroke before the draft is persisted.
pub const DRAFT_DEBOUNCE: Duration = Duration::from_secs(5);

/// Persisted draft blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    /// Room the draft belongs to.
    pub room_id: String,
    /// Draft text.
    pub text: String,
    /// Save time, Unix milliseconds.
    pub saved_at: i64,
}

/// In-memory dirty state awaiting its debounce deadline.
#[derive(Debug, Clone)]
struct DirtyDraft<I> {
    room_id: String,
    text: String,
    changed_at: I,
}

/// Debounced draft store over a durable key-value backend.
#[derive(Debug, Clone)]
pub struct DraftStore<S, I> {
    kv: S,
    dirty: Option<DirtyDraft<I>>,
}

impl<S, I> DraftStore<S, I>
where
    S: KvStore,
    I: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>,
{
    /// Create a draft store over the given backend.
    pub fn new(kv: S) -> Self {
        Self { kv, dirty: None }
    }

    /// Record an input change for `room_id`, restarting the debounce window.
    pub fn input_changed(&mut self, room_id: &str, text: &str, now: I) {
        self.dirty =
            Some(DirtyDraft { room_id: room_id.to_owned(), text: text.to_owned(), changed_at: now });
    }

    /// Persist the dirty draft if its debounce window has elapsed.
    ///
    /// Returns the room id that was flushed, if any.
    pub fn tick(&mut self, now: I, unix_millis: i64) -> Option<String> {
        let due = self
            .dirty
            .as_ref()
            .is_some_and(|d| now - d.changed_at >= DRAFT_DEBOUNCE);
        if due { self.flush(unix_millis) } else { None }
    }

    /// Persist the dirty draft immediately, bypassing the debounce.
    ///
    /// Returns the room id that was flushed, if any.
    pub fn flush(&mut self, unix_millis: i64) -> Option<String> {
        let dirty = self.dirty.take()?;
        self.persist(&dirty.room_id, &dirty.text, unix_millis);
        Some(dirty.room_id)
    }

    /// Switch rooms: flush the outgoing room's draft, then load the incoming
    /// room's stored draft.
    ///
    /// Returns the incoming room's draft text, or `None` if nothing usable
    /// is stored.
    pub fn switch(&mut self, incoming_room: &str, unix_millis: i64) -> Option<String> {
        self.flush(unix_millis);
        self.load(incoming_room)
    }

    /// Load a room's stored draft text.
    pub fn load(&self, room_id: &str) -> Option<String> {
        let raw = match self.kv.get(&keys::draft(room_id)) {
            Ok(value) => value?,
            Err(err) => {
                tracing::debug!(%room_id, %err, "draft load failed");
                return None;
            },
        };
        match serde_json::from_str::<Draft>(&raw) {
            Ok(draft) if !draft.text.is_empty() => Some(draft.text),
            Ok(_) => None,
            Err(err) => {
                tracing::debug!(%room_id, %err, "stored draft corrupt");
                None
            },
        }
    }

    /// Delete a room's stored draft, and any dirty state for it. Called once
    /// the message the draft described has been sent.
    pub fn clear(&mut self, room_id: &str) {
        if self.dirty.as_ref().is_some_and(|d| d.room_id == room_id) {
            self.dirty = None;
        }
        if let Err(err) = self.kv.remove(&keys::draft(room_id)) {
            tracing::debug!(%room_id, %err, "draft clear failed");
        }
    }

    /// Write one draft blob, removing instead when the text is blank so an
    /// empty draft can never shadow the absence of one.
    fn persist(&self, room_id: &str, text: &str, unix_millis: i64) {
        if text.trim().is_empty() {
            if let Err(err) = self.kv.remove(&keys::draft(room_id)) {
                tracing::debug!(%room_id, %err, "draft remove failed");
            }
            return;
        }

        let draft =
            Draft { room_id: room_id.to_owned(), text: text.to_owned(), saved_at: unix_millis };
        match serde_json::to_string(&draft) {
            Ok(blob) => {
                if let Err(err) = self.kv.put(&keys::draft(room_id), &blob) {
                    tracing::debug!(%room_id, %err, "draft save failed");
                }
            },
            Err(err) => tracing::debug!(%room_id, %err, "draft encode failed"),
        }
    }
}
