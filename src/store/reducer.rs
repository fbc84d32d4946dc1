use std::collections::HashSet;

use crate::common::{ChatMessage, Conversation};

use super::actions::ChatAction;
use super::state::ChatState;

/// Pure reduction over the chat state. No I/O, no clocks.
pub fn reduce(mut state: ChatState, action: ChatAction) -> ChatState {
    match action {
        ChatAction::Connected(connected) => {
            state.ws_connected = connected;
            if !connected {
                state.typing_users.clear();
            }
        }

        ChatAction::FetchConversationsRequest => {
            state.loading_conversations = true;
            state.error = None;
        }
        ChatAction::FetchConversationsSuccess(conversations) => {
            state.loading_conversations = false;
            merge_conversations(&mut state, conversations);
        }
        ChatAction::FetchConversationsFailure(error) => {
            state.loading_conversations = false;
            state.error = Some(error);
        }

        ChatAction::FetchHistoryRequest { friend_id } => {
            state.loading_history = Some(friend_id);
            state.error = None;
        }
        ChatAction::FetchHistorySuccess {
            friend_id,
            messages,
        } => {
            if state.loading_history.as_deref() == Some(friend_id.as_str()) {
                state.loading_history = None;
            }
            merge_history(&mut state, &friend_id, messages);
        }
        ChatAction::FetchHistoryFailure { friend_id, error } => {
            if state.loading_history.as_deref() == Some(friend_id.as_str()) {
                state.loading_history = None;
            }
            state.error = Some(error);
        }

        ChatAction::MessageReceived(message) => append_message(&mut state, message),
        ChatAction::SendFailure(error) => state.error = Some(error),

        ChatAction::IncrementUnread(friend_id) => {
            let conversation = state.conversation_mut(&friend_id);
            conversation.unread_count = conversation.unread_count.saturating_add(1);
        }
        ChatAction::ResetUnread(friend_id) => {
            state.conversation_mut(&friend_id).unread_count = 0;
        }
        ChatAction::MessagesRead {
            friend_id,
            message_ids,
        } => {
            let ids: HashSet<&str> = message_ids.iter().map(String::as_str).collect();
            let read = crate::common::MessageStatus::Read;
            if let Some(messages) = state.one_to_one_messages.get_mut(&friend_id) {
                for message in messages.iter_mut().filter(|m| ids.contains(m.id.as_str())) {
                    message.status = read;
                }
            }
            if let Some(last) = state
                .conversation_mut(&friend_id)
                .last_message
                .as_mut()
                .filter(|m| ids.contains(m.id.as_str()))
            {
                last.status = read;
            }
        }
        ChatAction::StatusUpdated {
            message_ids,
            status,
        } => {
            let ids: HashSet<&str> = message_ids.iter().map(String::as_str).collect();
            for_each_message(&mut state, |message| {
                if ids.contains(message.id.as_str()) && status > message.status {
                    message.status = status;
                }
            });
        }
        ChatAction::ReactionsUpdated {
            message_id,
            reactions,
        } => {
            for_each_message(&mut state, |message| {
                if message.id == message_id {
                    message.reactions = reactions.clone();
                }
            });
        }

        ChatAction::SetActiveConversation(friend_id) => state.active_conversation = friend_id,

        ChatAction::TypingChanged { user_id, typing } => {
            state.typing_users.insert(user_id, typing);
        }

        ChatAction::PresenceChanged {
            user_id,
            online,
            last_seen,
        } => {
            if let Some(last_seen) = last_seen {
                state.last_seen.insert(user_id.clone(), last_seen);
            }
            state.online_users.insert(user_id, online);
        }
        ChatAction::FetchPresenceSuccess(presences) => {
            for presence in presences {
                if let Some(last_seen) = presence.last_seen {
                    state.last_seen.insert(presence.user_id.clone(), last_seen);
                }
                state.online_users.insert(presence.user_id, presence.online);
            }
        }
        ChatAction::FetchPresenceFailure(error) => state.error = Some(error),

        ChatAction::ClearError => state.error = None,
    }
    state
}

fn append_message(state: &mut ChatState, message: ChatMessage) {
    let Some(friend_id) = message.conversation_id.clone() else {
        return;
    };
    let messages = state
        .one_to_one_messages
        .entry(friend_id.clone())
        .or_default();
    if messages.iter().any(|existing| existing.id == message.id) {
        return;
    }
    messages.push(message.clone());
    state.conversation_mut(&friend_id).last_message = Some(message);
}

fn merge_history(state: &mut ChatState, friend_id: &str, fetched: Vec<ChatMessage>) {
    let mut seen = HashSet::new();
    let mut merged: Vec<ChatMessage> = fetched
        .into_iter()
        .map(|mut message| {
            message.conversation_id = Some(friend_id.to_string());
            message
        })
        .filter(|message| seen.insert(message.id.clone()))
        .collect();

    // Live messages that arrived while the fetch was in flight. A local copy
    // that already moved further along keeps its status.
    if let Some(existing) = state.one_to_one_messages.remove(friend_id) {
        for local in existing {
            if seen.insert(local.id.clone()) {
                merged.push(local);
            } else if let Some(fetched) = merged.iter_mut().find(|m| m.id == local.id) {
                fetched.status = fetched.status.max(local.status);
            }
        }
    }
    merged.sort_by_key(|message| message.timestamp);

    let last = merged.last().cloned();
    state
        .one_to_one_messages
        .insert(friend_id.to_string(), merged);
    if let Some(mut last) = last {
        let conversation = state.conversation_mut(friend_id);
        if let Some(previous) = conversation.last_message.as_ref() {
            if previous.id == last.id {
                last.status = last.status.max(previous.status);
            }
        }
        conversation.last_message = Some(last);
    }
}

fn merge_conversations(state: &mut ChatState, fetched: Vec<Conversation>) {
    for conversation in fetched {
        // The open conversation is read as messages land.
        let active = state.is_active(&conversation.friend_id);
        let existing = state.conversation_mut(&conversation.friend_id);
        existing.unread_count = if active { 0 } else { conversation.unread_count };
        if conversation.last_message.is_some() {
            existing.last_message = conversation.last_message;
        }
    }
}

fn for_each_message(state: &mut ChatState, mut apply: impl FnMut(&mut ChatMessage)) {
    for messages in state.one_to_one_messages.values_mut() {
        messages.iter_mut().for_each(&mut apply);
    }
    for conversation in state.conversations.iter_mut() {
        if let Some(last) = conversation.last_message.as_mut() {
            apply(last);
        }
    }
}
