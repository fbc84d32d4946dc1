pub mod actions;
pub mod session;
pub mod typing;

pub use session::{ChatSession, ConnectionState, SessionOptions, SUBSCRIBER_KEY};
pub use typing::{TypingExpired, TypingTimers};
