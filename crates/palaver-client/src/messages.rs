//! Message stream reconciler.
//!
//! Maintains an ordered, deduplicated message log per room by merging three
//! sources into one sequence:
//!
//! - paginated history (newest-first pages, prepended at the head)
//! - live pushes (appended at the tail, or matched against an optimistic
//!   entry)
//! - optimistic local sends (appended immediately with `pending = true`)
//!
//! A pending entry is *replaced in place* when its confirmation arrives -
//! never duplicated. Matching prefers the echoed `client_tag`; for servers
//! that do not echo it, a (room, user, content) heuristic within a short
//! recency window is the fallback.

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use palaver_proto::Message;

/// How long after a local send a tag-less push may still claim the pending
/// entry. Identical rapid duplicates outside this window append normally.
pub const PENDING_MATCH_WINDOW: Duration = Duration::from_secs(10);

/// One entry in a room's log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// The message. Pending entries carry a provisional `local-` id.
    pub message: Message,
    /// Whether the entry still awaits server confirmation.
    pub pending: bool,
}

/// Result of applying a live push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// A pending entry was replaced in place.
    Confirmed {
        /// Room holding the entry.
        room_id: String,
        /// The confirmed server-assigned id.
        id: String,
    },
    /// The push was new and appended to the tail.
    Appended {
        /// Room the entry was appended to.
        room_id: String,
        /// The appended entry.
        entry: LogEntry,
    },
    /// The push's id was already present (re-delivery after reconnect).
    Duplicate,
}

/// A local send awaiting confirmation.
#[derive(Debug, Clone)]
struct PendingSend<I> {
    tag: String,
    local_id: String,
    room_id: String,
    user_id: String,
    content: String,
    sent_at: I,
}

/// Per-room message logs.
///
/// Generic over the instant type so recency matching works under virtual
/// time in tests.
#[derive(Debug, Clone, Default)]
pub struct MessageLog<I> {
    logs: HashMap<String, Vec<LogEntry>>,
    pending: Vec<PendingSend<I>>,
}

impl<I> MessageLog<I>
where
    I: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>,
{
    /// Create an empty log set.
    pub fn new() -> Self {
        Self { logs: HashMap::new(), pending: Vec::new() }
    }

    /// A room's log, oldest first. Empty slice if the room holds nothing.
    pub fn log(&self, room_id: &str) -> &[LogEntry] {
        self.logs.get(room_id).map_or(&[], Vec::as_slice)
    }

    /// Oldest confirmed message id in a room - the `before_id` pagination
    /// cursor. `None` when the log holds no confirmed entries.
    pub fn earliest_id(&self, room_id: &str) -> Option<&str> {
        self.logs
            .get(room_id)?
            .iter()
            .find(|e| !e.pending)
            .map(|e| e.message.id.as_str())
    }

    /// Append an optimistic local send and register it for reconciliation.
    ///
    /// The entry's provisional id is derived from `tag`; the confirming
    /// broadcast replaces it with the server-assigned id.
    #[allow(clippy::too_many_arguments)]
    pub fn append_local(
        &mut self,
        room_id: &str,
        user_id: &str,
        username: &str,
        content: &str,
        tag: &str,
        timestamp: i64,
        now: I,
    ) -> LogEntry {
        let local_id = format!("local-{tag}");
        let entry = LogEntry {
            message: Message {
                id: local_id.clone(),
                room_id: room_id.to_owned(),
                user_id: user_id.to_owned(),
                username: username.to_owned(),
                content: content.to_owned(),
                timestamp,
                client_tag: Some(tag.to_owned()),
            },
            pending: true,
        };

        self.pending.push(PendingSend {
            tag: tag.to_owned(),
            local_id,
            room_id: room_id.to_owned(),
            user_id: user_id.to_owned(),
            content: content.to_owned(),
            sent_at: now,
        });
        self.logs.entry(room_id.to_owned()).or_default().push(entry.clone());
        entry
    }

    /// Apply a live push (or an HTTP send confirmation).
    ///
    /// Matching order: echoed `client_tag`, then the recency heuristic, then
    /// id-dedup, then append. Messages with missing fields flow through
    /// unchanged - an odd entry beats an unexplained gap in the sequence.
    pub fn apply_push(&mut self, message: Message, now: I) -> PushOutcome {
        if let Some(idx) = self.match_pending(&message, now) {
            let send = self.pending.swap_remove(idx);
            return self.confirm(&send, message);
        }

        let room_id = message.room_id.clone();
        let log = self.logs.entry(room_id.clone()).or_default();
        if !message.id.is_empty() && log.iter().any(|e| e.message.id == message.id) {
            return PushOutcome::Duplicate;
        }

        let entry = LogEntry { message, pending: false };
        log.push(entry.clone());
        PushOutcome::Appended { room_id, entry }
    }

    /// Prepend one history page to a room's log.
    ///
    /// Pages arrive newest-first; the page is reversed and inserted before
    /// the currently held earliest entry, skipping ids already present.
    /// Pages for rooms other than `active_room` are ignored - switching
    /// rooms cancels interest in the abandoned room's pagination.
    ///
    /// Returns the number of entries actually inserted.
    pub fn apply_history_page(
        &mut self,
        active_room: Option<&str>,
        room_id: &str,
        page: &[Message],
    ) -> usize {
        // Older servers omit the page's room id; fall back to the messages'
        // own room before deciding whether the page is still wanted.
        let page_room = if room_id.is_empty() {
            page.first().map_or("", |m| m.room_id.as_str())
        } else {
            room_id
        };
        if page_room.is_empty() || active_room != Some(page_room) {
            return 0;
        }

        let log = self.logs.entry(page_room.to_owned()).or_default();
        let held: HashSet<&str> = log.iter().map(|e| e.message.id.as_str()).collect();

        let mut fresh: Vec<LogEntry> = page
            .iter()
            .rev()
            .filter(|m| m.id.is_empty() || !held.contains(m.id.as_str()))
            .map(|m| LogEntry { message: m.clone(), pending: false })
            .collect();

        let count = fresh.len();
        if count > 0 {
            fresh.extend(log.drain(..));
            *log = fresh;
        }
        count
    }

    /// Wipe a room's log and forget its pending sends. Used on room switch.
    pub fn clear(&mut self, room_id: &str) {
        self.logs.remove(room_id);
        self.pending.retain(|p| p.room_id != room_id);
    }

    /// Find the pending send a push confirms, if any.
    fn match_pending(&self, message: &Message, now: I) -> Option<usize> {
        if let Some(tag) = &message.client_tag {
            if let Some(idx) = self.pending.iter().position(|p| &p.tag == tag) {
                return Some(idx);
            }
        }

        // Heuristic fallback: same room, same sender, same content, sent
        // recently. Fragile for identical rapid duplicates, which is why the
        // tag takes precedence.
        self.pending.iter().position(|p| {
            p.room_id == message.room_id
                && p.user_id == message.user_id
                && p.content == message.content
                && now - p.sent_at <= PENDING_MATCH_WINDOW
        })
    }

    /// Replace the pending entry in place with its confirmation.
    fn confirm(&mut self, send: &PendingSend<I>, message: Message) -> PushOutcome {
        let id = message.id.clone();
        let room_id = send.room_id.clone();
        if let Some(log) = self.logs.get_mut(&send.room_id) {
            if let Some(entry) = log.iter_mut().find(|e| e.message.id == send.local_id) {
                entry.message = message;
                entry.pending = false;
                return PushOutcome::Confirmed { room_id, id };
            }
            // Log was cleared between send and confirmation; nothing to
            // replace, treat the push as fresh.
            let entry = LogEntry { message, pending: false };
            log.push(entry.clone());
            return PushOutcome::Appended { room_id, entry };
        }
        let entry = LogEntry { message, pending: false };
        self.logs.entry(room_id.clone()).or_default().push(entry.clone());
        PushOutcome::Appended { room_id, entry }
    }
}
