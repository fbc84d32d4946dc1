//! JSON frames exchanged over the chat WebSocket.

use serde::{Deserialize, Serialize};

use crate::common::{
    ChatMessage, PresenceEvent, ReactionEvent, StatusEvent, TargetType, TransportEvent,
    TypingEvent,
};

/// Frames the client pushes to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    Message {
        client_id: String,
        recipient_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply_to_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    TypingStart {
        target_id: String,
        target_type: TargetType,
    },
    #[serde(rename_all = "camelCase")]
    TypingStop {
        target_id: String,
        target_type: TargetType,
    },
    #[serde(rename_all = "camelCase")]
    Reaction {
        message_id: String,
        reaction: String,
    },
    #[serde(rename_all = "camelCase")]
    MarkRead { message_ids: Vec<String> },
}

/// Frames the server pushes to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    Message { message: ChatMessage },
    Typing(TypingEvent),
    Presence(PresenceEvent),
    Reaction(ReactionEvent),
    Status(StatusEvent),
    Error { message: String },
}

impl ClientFrame {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl ServerFrame {
    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// The subscriber-facing event, or `None` for control frames.
    pub fn into_event(self) -> Option<TransportEvent> {
        match self {
            Self::Message { message } => Some(TransportEvent::Message(message)),
            Self::Typing(event) => Some(TransportEvent::Typing(event)),
            Self::Presence(event) => Some(TransportEvent::Presence(event)),
            Self::Reaction(event) => Some(TransportEvent::Reaction(event)),
            Self::Status(event) => Some(TransportEvent::Status(event)),
            Self::Error { message } => {
                log::warn!("Server reported error: {message}");
                None
            }
        }
    }
}
