//! Wire entities shared by live-channel frames and HTTP fallback responses.
//!
//! Timestamps are Unix milliseconds throughout. Fields default when absent
//! so a partially populated entity still decodes; downstream consumers are
//! expected to tolerate empty strings and zero timestamps.

use serde::{Deserialize, Serialize};

/// A chat message.
///
/// `id` is unique within a room once the server has confirmed the message.
/// Optimistic local sends carry a provisional `local-` prefixed id until the
/// confirming broadcast replaces them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned message id (provisional `local-…` id while pending).
    #[serde(default)]
    pub id: String,
    /// Room this message belongs to.
    #[serde(default)]
    pub room_id: String,
    /// Sender's user id.
    #[serde(default)]
    pub user_id: String,
    /// Sender's username at send time.
    #[serde(default)]
    pub username: String,
    /// Message body.
    #[serde(default)]
    pub content: String,
    /// Send time, Unix milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    /// Client-generated correlation token, echoed by the server so the
    /// sender can match the broadcast against its optimistic entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_tag: Option<String>,
}

/// A chat room as known to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Stable room id.
    #[serde(default)]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Whether the room is invite-only.
    #[serde(default)]
    pub is_private: bool,
    /// Number of members, as last reported by the server.
    #[serde(default)]
    pub member_count: u32,
    /// Messages received while the room was not active.
    #[serde(default)]
    pub unread_count: u32,
    /// Last message activity, Unix milliseconds.
    #[serde(default)]
    pub last_activity: i64,
}

/// A user in the active room's roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable user id.
    #[serde(default)]
    pub id: String,
    /// Login name.
    #[serde(default)]
    pub username: String,
    /// Optional display name shown instead of the username.
    #[serde(default)]
    pub display_name: String,
    /// Presence status.
    #[serde(default)]
    pub status: UserStatus,
    /// Public-key material, persisted locally when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// Presence status of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Actively connected.
    Online,
    /// Connected but idle.
    Away,
    /// Connected, do not disturb.
    Busy,
    /// Not connected.
    #[default]
    Offline,
}

/// Identity returned by the HTTP bootstrap endpoint (`GET /api/identity`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Identity {
    /// Server-known user id, if the client has one.
    #[serde(default)]
    pub id: Option<String>,
    /// Stored username, if any. `None` means authenticate anonymously.
    #[serde(default)]
    pub username: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_decodes_with_missing_fields() {
        let msg: Message = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.id, "");
        assert_eq!(msg.timestamp, 0);
        assert_eq!(msg.client_tag, None);
    }

    #[test]
    fn user_status_defaults_to_offline() {
        let user: User = serde_json::from_str(r#"{"id":"u1","username":"ada"}"#).unwrap();
        assert_eq!(user.status, UserStatus::Offline);

        let user: User =
            serde_json::from_str(r#"{"id":"u1","username":"ada","status":"busy"}"#).unwrap();
        assert_eq!(user.status, UserStatus::Busy);
    }

    #[test]
    fn client_tag_omitted_when_absent() {
        let msg = Message {
            id: "m1".into(),
            room_id: "r1".into(),
            user_id: "u1".into(),
            username: "ada".into(),
            content: "hi".into(),
            timestamp: 1000,
            client_tag: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("client_tag"));
    }
}
