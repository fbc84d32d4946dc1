#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_social_chat::common::{
    ChatMessage, Conversation, MessageStatus, Presence, TransportEvent,
};
use rust_social_chat::network::protocol::ClientFrame;
use rust_social_chat::network::{
    ApiError, ChatApi, ConnectCallback, DisconnectCallback, SubscriberRegistry, Transport,
};
use rust_social_chat::store::{ChatState, Store};

/// In-process transport double. Connects immediately unless built with
/// [`FakeTransport::manual`].
pub struct FakeTransport {
    registry: Arc<SubscriberRegistry>,
    auto_accept: bool,
    connected: AtomicBool,
    pending: Mutex<Option<(ConnectCallback, DisconnectCallback)>>,
    on_disconnect: Mutex<Option<DisconnectCallback>>,
    frames: Mutex<Vec<ClientFrame>>,
    pub connect_calls: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(true))
    }

    pub fn manual() -> Arc<Self> {
        Arc::new(Self::build(false))
    }

    fn build(auto_accept: bool) -> Self {
        Self {
            registry: SubscriberRegistry::new(),
            auto_accept,
            connected: AtomicBool::new(false),
            pending: Mutex::new(None),
            on_disconnect: Mutex::new(None),
            frames: Mutex::new(Vec::new()),
            connect_calls: AtomicUsize::new(0),
        }
    }

    fn open(&self, on_connect: ConnectCallback, on_disconnect: DisconnectCallback) {
        self.connected.store(true, Ordering::SeqCst);
        self.registry.activate();
        *self.on_disconnect.lock().unwrap() = Some(on_disconnect);
        on_connect();
    }

    pub fn accept(&self) {
        let (on_connect, on_disconnect) = self.pending.lock().unwrap().take().expect("no pending connect");
        self.open(on_connect, on_disconnect);
    }

    pub fn reject(&self, reason: &str) {
        let (_, on_disconnect) = self.pending.lock().unwrap().take().expect("no pending connect");
        on_disconnect(Some(reason.to_string()));
    }

    /// Simulates the server dropping an established link.
    pub fn drop_link(&self, reason: &str) {
        self.connected.store(false, Ordering::SeqCst);
        self.registry.deactivate();
        let callback = self.on_disconnect.lock().unwrap().take();
        if let Some(on_disconnect) = callback {
            on_disconnect(Some(reason.to_string()));
        }
    }

    /// Pushes an inbound event; returns how many subscribers saw it.
    pub fn emit(&self, event: TransportEvent) -> usize {
        self.registry.dispatch(event)
    }

    pub fn frames(&self) -> Vec<ClientFrame> {
        self.frames.lock().unwrap().clone()
    }

    pub fn mark_read_batches(&self) -> Vec<Vec<String>> {
        self.frames()
            .into_iter()
            .filter_map(|frame| match frame {
                ClientFrame::MarkRead { message_ids } => Some(message_ids),
                _ => None,
            })
            .collect()
    }
}

impl Transport for FakeTransport {
    fn connect(&self, _user_id: &str, on_connect: ConnectCallback, on_disconnect: DisconnectCallback) {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.auto_accept {
            self.open(on_connect, on_disconnect);
        } else {
            *self.pending.lock().unwrap() = Some((on_connect, on_disconnect));
        }
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.registry.deactivate();
        self.pending.lock().unwrap().take();
        self.on_disconnect.lock().unwrap().take();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    fn send_frame(&self, frame: ClientFrame) {
        if self.is_connected() {
            self.frames.lock().unwrap().push(frame);
        }
    }
}

/// Scripted REST backend.
#[derive(Default)]
pub struct FakeApi {
    pub conversations: Mutex<Vec<Conversation>>,
    pub history: Mutex<HashMap<String, Vec<ChatMessage>>>,
    pub presences: Mutex<Vec<Presence>>,
    pub fail_all: AtomicBool,
    /// History requests never complete while set.
    pub stall_history: AtomicBool,
    pub sent: Mutex<Vec<(String, String)>>,
    pub mark_read_calls: Mutex<Vec<Vec<String>>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn check(&self) -> Result<(), ApiError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 500,
                message: "Server exploded".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        self.check()?;
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn history(&self, friend_id: &str) -> Result<Vec<ChatMessage>, ApiError> {
        if self.stall_history.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.check()?;
        Ok(self
            .history
            .lock()
            .unwrap()
            .get(friend_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_one_to_one(
        &self,
        recipient_id: &str,
        content: &str,
        reply_to_id: Option<&str>,
    ) -> Result<ChatMessage, ApiError> {
        self.check()?;
        self.sent
            .lock()
            .unwrap()
            .push((recipient_id.to_string(), content.to_string()));
        let mut stored = message("rest-1", "A", recipient_id, 100);
        stored.content = content.to_string();
        stored.reply_to_id = reply_to_id.map(str::to_string);
        Ok(stored)
    }

    async fn mark_read(&self, message_ids: &[String]) -> Result<(), ApiError> {
        self.check()?;
        self.mark_read_calls.lock().unwrap().push(message_ids.to_vec());
        Ok(())
    }

    async fn presence_batch(&self, user_ids: &[String]) -> Result<Vec<Presence>, ApiError> {
        self.check()?;
        Ok(self
            .presences
            .lock()
            .unwrap()
            .iter()
            .filter(|presence| user_ids.contains(&presence.user_id))
            .cloned()
            .collect())
    }
}

/// A message with a fixed timestamp `seconds` after the epoch.
pub fn message(id: &str, sender: &str, recipient: &str, seconds: i64) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        sender: sender.to_string(),
        recipient: recipient.to_string(),
        content: format!("content of {id}"),
        status: MessageStatus::Sent,
        reactions: Vec::new(),
        reply_to_id: None,
        conversation_id: None,
        timestamp: Utc.timestamp_opt(seconds, 0).unwrap(),
    }
}

/// Lets spawned tasks drain their queues.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

pub async fn wait_until(store: &Store, condition: impl Fn(&ChatState) -> bool) {
    let mut changes = store.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if condition(&changes.borrow_and_update()) {
                return;
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    })
    .await
    .expect("store never reached the expected state");
}
