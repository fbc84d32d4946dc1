use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::common::{ChatMessage, Conversation};

/// Trạng thái chat phía client, chỉ được thay đổi qua `reduce`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    pub conversations: Vec<Conversation>,
    /// friend_id -> messages in display order
    pub one_to_one_messages: HashMap<String, Vec<ChatMessage>>,
    pub typing_users: HashMap<String, bool>,
    pub online_users: HashMap<String, bool>,
    pub last_seen: HashMap<String, DateTime<Utc>>,
    pub ws_connected: bool,
    pub active_conversation: Option<String>,
    pub loading_conversations: bool,
    pub loading_history: Option<String>,
    pub error: Option<String>,
}

impl ChatState {
    pub fn conversation(&self, friend_id: &str) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|conversation| conversation.friend_id == friend_id)
    }

    pub(crate) fn conversation_mut(&mut self, friend_id: &str) -> &mut Conversation {
        let index = match self
            .conversations
            .iter()
            .position(|conversation| conversation.friend_id == friend_id)
        {
            Some(index) => index,
            None => {
                self.conversations.push(Conversation::new(friend_id));
                self.conversations.len() - 1
            }
        };
        &mut self.conversations[index]
    }

    pub fn unread_count(&self, friend_id: &str) -> u32 {
        self.conversation(friend_id)
            .map(|conversation| conversation.unread_count)
            .unwrap_or(0)
    }

    pub fn total_unread(&self) -> u32 {
        self.conversations
            .iter()
            .map(|conversation| conversation.unread_count)
            .sum()
    }

    pub fn messages_with(&self, friend_id: &str) -> &[ChatMessage] {
        self.one_to_one_messages
            .get(friend_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains_message(&self, friend_id: &str, message_id: &str) -> bool {
        self.messages_with(friend_id)
            .iter()
            .any(|message| message.id == message_id)
    }

    /// Ids of messages sent by `friend_id` that are not read yet.
    pub fn unread_ids_from(&self, friend_id: &str) -> Vec<String> {
        self.messages_with(friend_id)
            .iter()
            .filter(|message| message.sender == friend_id && message.is_unread())
            .map(|message| message.id.clone())
            .collect()
    }

    pub fn is_typing(&self, user_id: &str) -> bool {
        self.typing_users.get(user_id).copied().unwrap_or(false)
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.online_users.get(user_id).copied().unwrap_or(false)
    }

    pub fn is_active(&self, friend_id: &str) -> bool {
        self.active_conversation.as_deref() == Some(friend_id)
    }
}
