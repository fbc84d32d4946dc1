use chrono::{DateTime, Utc};

use crate::common::{ChatMessage, Conversation, MessageStatus, Presence, Reaction};

/// Mọi thay đổi lên `ChatState` đều đi qua một action.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatAction {
    Connected(bool),

    FetchConversationsRequest,
    FetchConversationsSuccess(Vec<Conversation>),
    FetchConversationsFailure(String),

    FetchHistoryRequest {
        friend_id: String,
    },
    FetchHistorySuccess {
        friend_id: String,
        messages: Vec<ChatMessage>,
    },
    FetchHistoryFailure {
        friend_id: String,
        error: String,
    },

    /// Appends to the conversation named by `conversation_id` and bumps
    /// its `last_message`. Ignored when the id is already present.
    MessageReceived(ChatMessage),
    SendFailure(String),

    IncrementUnread(String),
    ResetUnread(String),
    MessagesRead {
        friend_id: String,
        message_ids: Vec<String>,
    },
    StatusUpdated {
        message_ids: Vec<String>,
        status: MessageStatus,
    },
    ReactionsUpdated {
        message_id: String,
        reactions: Vec<Reaction>,
    },

    SetActiveConversation(Option<String>),

    TypingChanged {
        user_id: String,
        typing: bool,
    },

    PresenceChanged {
        user_id: String,
        online: bool,
        last_seen: Option<DateTime<Utc>>,
    },
    FetchPresenceSuccess(Vec<Presence>),
    FetchPresenceFailure(String),

    ClearError,
}
