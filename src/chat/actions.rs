//! REST-backed operations. Each one dispatches its request/success/failure
//! actions and hands the error back to the caller for logging.

use crate::common::ChatMessage;
use crate::network::{ApiError, ChatApi};
use crate::store::{ChatAction, Store};

pub async fn fetch_conversations(api: &dyn ChatApi, store: &Store) -> Result<(), ApiError> {
    store.dispatch(ChatAction::FetchConversationsRequest);
    match api.conversations().await {
        Ok(conversations) => {
            log::debug!("Fetched {} conversations", conversations.len());
            store.dispatch(ChatAction::FetchConversationsSuccess(conversations));
            Ok(())
        }
        Err(err) => {
            store.dispatch(ChatAction::FetchConversationsFailure(err.user_message()));
            Err(err)
        }
    }
}

pub async fn fetch_history(
    api: &dyn ChatApi,
    store: &Store,
    friend_id: &str,
) -> Result<Vec<ChatMessage>, ApiError> {
    store.dispatch(ChatAction::FetchHistoryRequest {
        friend_id: friend_id.to_string(),
    });
    match api.history(friend_id).await {
        Ok(messages) => {
            store.dispatch(ChatAction::FetchHistorySuccess {
                friend_id: friend_id.to_string(),
                messages: messages.clone(),
            });
            Ok(messages)
        }
        Err(err) => {
            store.dispatch(ChatAction::FetchHistoryFailure {
                friend_id: friend_id.to_string(),
                error: err.user_message(),
            });
            Err(err)
        }
    }
}

pub async fn fetch_presence(
    api: &dyn ChatApi,
    store: &Store,
    user_ids: &[String],
) -> Result<(), ApiError> {
    if user_ids.is_empty() {
        return Ok(());
    }
    match api.presence_batch(user_ids).await {
        Ok(presences) => {
            store.dispatch(ChatAction::FetchPresenceSuccess(presences));
            Ok(())
        }
        Err(err) => {
            store.dispatch(ChatAction::FetchPresenceFailure(err.user_message()));
            Err(err)
        }
    }
}

/// Sends through `POST /api/chats/one-to-one` and appends the stored message.
pub async fn send_one_to_one(
    api: &dyn ChatApi,
    store: &Store,
    current_user: &str,
    recipient_id: &str,
    content: &str,
    reply_to_id: Option<&str>,
) -> Result<ChatMessage, ApiError> {
    match api.send_one_to_one(recipient_id, content, reply_to_id).await {
        Ok(message) => {
            let message = message.with_conversation(current_user);
            store.dispatch(ChatAction::MessageReceived(message.clone()));
            Ok(message)
        }
        Err(err) => {
            store.dispatch(ChatAction::SendFailure(err.user_message()));
            Err(err)
        }
    }
}
