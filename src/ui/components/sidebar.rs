use chrono::{DateTime, Utc};

use crate::store::ChatState;

/// Danh sách hội thoại, mỗi dòng một bạn.
pub fn render(state: &ChatState, now: DateTime<Utc>) -> Vec<String> {
    if state.conversations.is_empty() {
        return vec!["No conversations yet".to_string()];
    }

    state
        .conversations
        .iter()
        .map(|conversation| {
            let friend = &conversation.friend_id;
            let mut line = format!("{} {friend}", presence_dot(state, friend));
            if conversation.unread_count > 0 {
                line.push_str(&format!(" [{} unread]", conversation.unread_count));
            }
            if let Some(seen) = last_seen_label(state, friend, now) {
                line.push_str(&format!(" ({seen})"));
            }
            if let Some(last) = &conversation.last_message {
                line.push_str(&format!(": {}", preview(&last.content)));
            }
            line
        })
        .collect()
}

pub fn presence_dot(state: &ChatState, user_id: &str) -> &'static str {
    if state.is_online(user_id) { "●" } else { "○" }
}

/// Chỉ hiển thị khi bạn đang offline.
pub fn last_seen_label(state: &ChatState, user_id: &str, now: DateTime<Utc>) -> Option<String> {
    if state.is_online(user_id) {
        return None;
    }
    let last_seen = state.last_seen.get(user_id)?;
    let seconds = now.signed_duration_since(*last_seen).num_seconds().max(0);
    Some(match seconds {
        0..=59 => "just now".to_string(),
        60..=3599 => format!("seen {}m ago", seconds / 60),
        3600..=86399 => format!("seen {}h ago", seconds / 3600),
        _ => format!("seen {}", last_seen.format("%Y-%m-%d")),
    })
}

fn preview(content: &str) -> String {
    const MAX: usize = 32;
    if content.chars().count() <= MAX {
        content.to_string()
    } else {
        let cut: String = content.chars().take(MAX).collect();
        format!("{cut}…")
    }
}
