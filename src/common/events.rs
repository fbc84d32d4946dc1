use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{ChatMessage, MessageStatus, Reaction};

/// Sự kiện "đang gõ" từ tầng mạng gửi lên.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEvent {
    pub user_id: String,
    #[serde(default)]
    pub target_id: Option<String>,
    pub typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEvent {
    pub user_id: String,
    pub online: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Full reaction list of a message after an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionEvent {
    pub message_id: String,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

/// Delivery/read receipt for a batch of messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub message_ids: Vec<String>,
    pub status: MessageStatus,
}

/// Everything the transport can push to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(ChatMessage),
    Typing(TypingEvent),
    Presence(PresenceEvent),
    Reaction(ReactionEvent),
    Status(StatusEvent),
}
