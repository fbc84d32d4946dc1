use chrono::Utc;

use crate::store::ChatState;

use super::components::{chat_area, sidebar, status_bar};

/// Trạng thái cục bộ của UI: snapshot cuối cùng đã được in ra.
#[derive(Default)]
pub struct ViewState {
    shown: ChatState,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines for everything that changed since the last rendered snapshot.
    pub fn update(&mut self, current_user: &str, next: &ChatState) -> Vec<String> {
        let shown = &self.shown;
        let mut lines = Vec::new();

        if shown.ws_connected != next.ws_connected {
            lines.push(status_bar::connection(next.ws_connected));
        }
        if let Some(error) = &next.error {
            if shown.error.as_ref() != Some(error) {
                lines.push(status_bar::error(error));
            }
        }

        if let Some(friend) = &next.active_conversation {
            let reopened = !shown.is_active(friend);
            if reopened {
                lines.push(format!("── {friend} ──"));
            }
            for message in next.messages_with(friend) {
                let changed = shown
                    .messages_with(friend)
                    .iter()
                    .find(|old| old.id == message.id)
                    .is_none_or(|old| old != message);
                if reopened || changed {
                    lines.push(chat_area::render(message, current_user));
                }
            }
        }

        for conversation in &next.conversations {
            let friend = &conversation.friend_id;
            if !next.is_active(friend) && conversation.unread_count > shown.unread_count(friend) {
                lines.push(format!(
                    "{friend}: {} unread",
                    conversation.unread_count
                ));
            }
        }

        let mut typing: Vec<&String> = next
            .typing_users
            .keys()
            .filter(|user| next.is_typing(user) && !shown.is_typing(user))
            .collect();
        typing.sort();
        lines.extend(typing.into_iter().map(|user| status_bar::typing(user)));

        let now = Utc::now();
        let mut presence: Vec<&String> = next
            .online_users
            .keys()
            .filter(|user| shown.online_users.get(*user) != next.online_users.get(*user))
            .collect();
        presence.sort();
        for user in presence {
            let mut line = format!("{} {user}", sidebar::presence_dot(next, user));
            if let Some(seen) = sidebar::last_seen_label(next, user, now) {
                line.push_str(&format!(" ({seen})"));
            }
            lines.push(line);
        }

        self.shown = next.clone();
        lines
    }
}
