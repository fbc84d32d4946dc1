use crate::common::{ChatMessage, MessageStatus};

pub fn render(message: &ChatMessage, current_user: &str) -> String {
    let time = message.timestamp.format("%H:%M");
    let author = if message.sender == current_user {
        "you"
    } else {
        message.sender.as_str()
    };

    let mut line = format!("[{time}] {author}: {}", message.content);
    if message.sender == current_user {
        line.push_str(status_mark(message.status));
    }
    if !message.reactions.is_empty() {
        let emojis: Vec<&str> = message
            .reactions
            .iter()
            .map(|reaction| reaction.emoji.as_str())
            .collect();
        line.push_str(&format!("  {}", emojis.join("")));
    }
    line
}

fn status_mark(status: MessageStatus) -> &'static str {
    match status {
        MessageStatus::Sent => " ✓",
        MessageStatus::Delivered => " ✓✓",
        MessageStatus::Read => " ✓✓ read",
    }
}
