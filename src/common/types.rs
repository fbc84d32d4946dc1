use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trạng thái giao nhận của một tin nhắn. Chỉ tiến, không lùi.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl Default for MessageStatus {
    fn default() -> Self {
        Self::Sent
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub user_id: String,
    pub emoji: String,
}

/// Domain model đại diện một tin nhắn chat 1-1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub content: String,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    /// Friend id of the conversation, filled in on the client side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Whichever of sender/recipient is not `current_user`.
    pub fn partner_of(&self, current_user: &str) -> &str {
        if self.sender == current_user {
            &self.recipient
        } else {
            &self.sender
        }
    }

    pub fn with_conversation(mut self, current_user: &str) -> Self {
        self.conversation_id = Some(self.partner_of(current_user).to_string());
        self
    }

    pub fn is_unread(&self) -> bool {
        self.status != MessageStatus::Read
    }
}

/// Hội thoại với một người bạn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub friend_id: String,
    #[serde(default)]
    pub last_message: Option<ChatMessage>,
    #[serde(default)]
    pub unread_count: u32,
}

impl Conversation {
    pub fn new(friend_id: impl Into<String>) -> Self {
        Self {
            friend_id: friend_id.into(),
            last_message: None,
            unread_count: 0,
        }
    }
}

/// Trạng thái online của một người dùng.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub user_id: String,
    pub online: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

/// What a typing indicator points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetType {
    User,
    Group,
}

impl Default for TargetType {
    fn default() -> Self {
        Self::User
    }
}
