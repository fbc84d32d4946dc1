use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;

use crate::common::{ChatMessage, Conversation, Presence};

use super::signals::{AppSignal, SignalBus};

const GENERIC_ERROR: &str = "Something went wrong. Please try again.";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    #[error("Not authenticated")]
    Unauthorized,
}

impl ApiError {
    /// Text suitable for a snackbar.
    pub fn user_message(&self) -> String {
        match self {
            Self::Status { message, .. } => message.clone(),
            Self::Unauthorized => "Your session has expired. Please log in again.".to_string(),
            Self::Http(err) if err.is_timeout() => "The server took too long to respond.".to_string(),
            Self::Http(_) => GENERIC_ERROR.to_string(),
        }
    }
}

/// Picks the server's `message`, then `error`, then a generic text.
pub fn error_message(body: &str, status: StatusCode) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    parsed
        .as_ref()
        .and_then(|value| {
            ["message", "error"].iter().find_map(|field| {
                value
                    .get(field)
                    .and_then(|v| v.as_str())
                    .filter(|text| !text.trim().is_empty())
                    .map(str::to_string)
            })
        })
        .unwrap_or_else(|| match status.canonical_reason() {
            Some(reason) => format!("{GENERIC_ERROR} ({reason})"),
            None => GENERIC_ERROR.to_string(),
        })
}

/// Bearer token kept in memory and, optionally, in a file.
pub struct TokenStore {
    path: Option<PathBuf>,
    token: RwLock<Option<String>>,
}

impl TokenStore {
    pub fn in_memory(token: Option<String>) -> Self {
        Self {
            path: None,
            token: RwLock::new(token),
        }
    }

    /// Reads the token file if it exists. A missing file means logged out.
    pub fn load(path: PathBuf) -> Self {
        let token = match fs::read_to_string(&path) {
            Ok(content) => Some(content.trim().to_string()).filter(|token| !token.is_empty()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                log::warn!("Failed to read token file {}: {err}", path.display());
                None
            }
        };
        Self {
            path: Some(path),
            token: RwLock::new(token),
        }
    }

    pub fn get(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set(&self, token: String) {
        if let Some(path) = &self.path {
            let written = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map_or(Ok(()), fs::create_dir_all)
                .and_then(|_| fs::write(path, &token));
            if let Err(err) = written {
                log::warn!("Failed to persist token to {}: {err}", path.display());
            }
        }
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token);
    }

    pub fn clear(&self) {
        if let Some(path) = &self.path {
            if let Err(err) = fs::remove_file(path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Failed to remove token file {}: {err}", path.display());
                }
            }
        }
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

/// REST endpoints used by the chat session.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn conversations(&self) -> Result<Vec<Conversation>, ApiError>;

    async fn history(&self, friend_id: &str) -> Result<Vec<ChatMessage>, ApiError>;

    async fn send_one_to_one(
        &self,
        recipient_id: &str,
        content: &str,
        reply_to_id: Option<&str>,
    ) -> Result<ChatMessage, ApiError>;

    async fn mark_read(&self, message_ids: &[String]) -> Result<(), ApiError>;

    async fn presence_batch(&self, user_ids: &[String]) -> Result<Vec<Presence>, ApiError>;
}

pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenStore>,
    signals: SignalBus,
}

impl HttpChatApi {
    pub fn new(
        base_url: &str,
        tokens: Arc<TokenStore>,
        signals: SignalBus,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
            signals,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let request = match self.tokens.get() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await?;
        self.check(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check(&self, response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let path = response.url().path().to_string();
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body, status);
        log::warn!("{path} failed with {status}: {message}");

        match status {
            StatusCode::UNAUTHORIZED => {
                self.tokens.clear();
                self.signals.publish(AppSignal::SessionExpired);
                return Err(ApiError::Unauthorized);
            }
            StatusCode::FORBIDDEN => self.signals.publish(AppSignal::Forbidden(message.clone())),
            StatusCode::NOT_FOUND => self.signals.publish(AppSignal::NotFound(path)),
            status if status.is_server_error() => self.signals.publish(AppSignal::ServerError {
                status: status.as_u16(),
                message: message.clone(),
            }),
            _ => {}
        }

        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        self.send_json(self.client.get(self.url("/api/chats/conversations")))
            .await
    }

    async fn history(&self, friend_id: &str) -> Result<Vec<ChatMessage>, ApiError> {
        let request = self
            .client
            .get(self.url("/api/chats/between"))
            .query(&[("userId2", friend_id)]);
        self.send_json(request).await
    }

    async fn send_one_to_one(
        &self,
        recipient_id: &str,
        content: &str,
        reply_to_id: Option<&str>,
    ) -> Result<ChatMessage, ApiError> {
        let request = self
            .client
            .post(self.url("/api/chats/one-to-one"))
            .json(&json!({
                "recipientId": recipient_id,
                "content": content,
                "replyToId": reply_to_id,
            }));
        self.send_json(request).await
    }

    async fn mark_read(&self, message_ids: &[String]) -> Result<(), ApiError> {
        let request = self
            .client
            .post(self.url("/api/chats/mark-read"))
            .json(&json!({ "messageIds": message_ids }));
        self.send(request).await.map(|_| ())
    }

    async fn presence_batch(&self, user_ids: &[String]) -> Result<Vec<Presence>, ApiError> {
        let request = self
            .client
            .post(self.url("/api/chats/presence/batch"))
            .json(&json!({ "userIds": user_ids }));
        self.send_json(request).await
    }
}
