pub mod commands;
pub mod events;
pub mod types;

pub use commands::ChatCommand;
pub use events::{PresenceEvent, ReactionEvent, StatusEvent, TransportEvent, TypingEvent};
pub use types::{ChatMessage, Conversation, MessageStatus, Presence, Reaction, TargetType};
