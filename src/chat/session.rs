use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::common::{
    ChatMessage, MessageStatus, PresenceEvent, ReactionEvent, StatusEvent, TargetType,
    TransportEvent, TypingEvent,
};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::network::{Callback, ChatApi, Transport, Unsubscribe};
use crate::storage::MessageCache;
use crate::store::{ChatAction, Store};

use super::actions;
use super::typing::TypingTimers;

/// Key under which the session registers its transport subscribers.
pub const SUBSCRIBER_KEY: &str = "chatSession";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Clone)]
pub struct SessionOptions {
    pub typing_timeout: Duration,
    /// Delay before reconnecting after the link drops; `None` disables it.
    pub reconnect_delay: Option<Duration>,
    pub history_limit: usize,
    pub cache: Option<Arc<MessageCache>>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl SessionOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            typing_timeout: config.typing_timeout(),
            reconnect_delay: config.reconnect_delay_ms.map(Duration::from_millis),
            history_limit: config.history_limit,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<MessageCache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

/// Everything the session loop reacts to. Events carry the connection epoch
/// they were produced under so leftovers from an old link are dropped.
enum SessionEvent {
    Connected { epoch: u64 },
    Disconnected { epoch: u64, reason: Option<String> },
    Inbound { epoch: u64, event: TransportEvent },
    Reconnect { epoch: u64 },
    CancelTimers,
}

struct Shared<T: Transport> {
    transport: Arc<T>,
    api: Arc<dyn ChatApi>,
    store: Store,
    options: SessionOptions,
    user_id: Mutex<Option<String>>,
    state: Mutex<ConnectionState>,
    epoch: AtomicU64,
    subscriptions: Mutex<Vec<Unsubscribe>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    cancel: watch::Sender<u64>,
}

/// Real-time chat for one logged-in user.
///
/// Owns the transport subscriptions, the typing timers and the event loop
/// that turns transport events into store actions. Dropping the session
/// disconnects it.
pub struct ChatSession<T: Transport> {
    shared: Arc<Shared<T>>,
    task: JoinHandle<()>,
}

impl<T: Transport> ChatSession<T> {
    /// Must be called inside a Tokio runtime.
    pub fn new(
        transport: Arc<T>,
        api: Arc<dyn ChatApi>,
        store: Store,
        options: SessionOptions,
    ) -> Self {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (cancel, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            transport,
            api,
            store,
            options,
            user_id: Mutex::new(None),
            state: Mutex::new(ConnectionState::Disconnected),
            epoch: AtomicU64::new(0),
            subscriptions: Mutex::new(Vec::new()),
            events,
            cancel,
        });
        let task = tokio::spawn(run_loop(shared.clone(), events_rx));
        Self { shared, task }
    }

    pub fn store(&self) -> &Store {
        &self.shared.store
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.shared.transport
    }

    pub fn connection_state(&self) -> ConnectionState {
        *lock(&self.shared.state)
    }

    pub fn user_id(&self) -> Option<String> {
        self.shared.current_user()
    }

    /// Starts connecting as `user_id`. Ignored unless disconnected.
    pub fn connect(&self, user_id: &str) {
        self.shared.connect(user_id);
    }

    /// Closes the link, drops all subscriptions and typing timers, and
    /// cancels in-flight REST requests.
    pub fn disconnect(&self) {
        self.shared.teardown(true);
    }

    /// Sends over the socket, or over REST while the socket is down.
    pub async fn send_message(
        &self,
        recipient_id: &str,
        content: &str,
        reply_to_id: Option<&str>,
    ) -> Result<()> {
        let shared = &self.shared;
        if shared.transport.is_connected() {
            shared
                .transport
                .send_message(recipient_id, content, reply_to_id);
            return Ok(());
        }

        let me = shared.current_user().ok_or(Error::NotConnected)?;
        log::info!("Socket down, sending to {recipient_id} over REST");
        let sent = shared
            .cancellable(actions::send_one_to_one(
                shared.api.as_ref(),
                &shared.store,
                &me,
                recipient_id,
                content,
                reply_to_id,
            ))
            .await;
        match sent {
            Some(Ok(message)) => {
                shared.cache_message(&message);
                Ok(())
            }
            Some(Err(err)) => Err(err.into()),
            None => Err(Error::NotConnected),
        }
    }

    pub fn start_typing(&self, target_id: &str) {
        self.shared
            .transport
            .send_typing_start(target_id, TargetType::User);
    }

    pub fn stop_typing(&self, target_id: &str) {
        self.shared
            .transport
            .send_typing_stop(target_id, TargetType::User);
    }

    pub fn add_reaction(&self, message_id: &str, reaction: &str) {
        self.shared.transport.send_reaction(message_id, reaction);
    }

    /// Opens the conversation with `friend_id`: loads its history, clears the
    /// unread counter and acknowledges every unread message in one batch.
    pub async fn select_conversation(&self, friend_id: &str) {
        let shared = &self.shared;
        shared
            .store
            .dispatch(ChatAction::SetActiveConversation(Some(friend_id.to_string())));
        shared
            .store
            .dispatch(ChatAction::ResetUnread(friend_id.to_string()));
        shared.hydrate_from_cache(friend_id);

        let history = shared
            .cancellable(actions::fetch_history(
                shared.api.as_ref(),
                &shared.store,
                friend_id,
            ))
            .await;
        match history {
            Some(Ok(messages)) => messages
                .iter()
                .for_each(|message| shared.cache_message(message)),
            Some(Err(err)) => log::warn!("History with {friend_id} unavailable: {err}"),
            None => return,
        }

        let unread = shared.store.select(|state| state.unread_ids_from(friend_id));
        if unread.is_empty() {
            return;
        }
        log::debug!("Marking {} messages from {friend_id} read", unread.len());
        shared.mark_read_locally(friend_id, unread.clone());
        shared.mark_read_remote(&unread).await;
    }

    pub fn close_conversation(&self) {
        self.shared
            .store
            .dispatch(ChatAction::SetActiveConversation(None));
    }

    pub async fn fetch_conversations(&self) -> Result<()> {
        let shared = &self.shared;
        match shared
            .cancellable(actions::fetch_conversations(
                shared.api.as_ref(),
                &shared.store,
            ))
            .await
        {
            Some(result) => Ok(result?),
            None => Ok(()),
        }
    }

    pub async fn refresh_presence(&self, user_ids: &[String]) -> Result<()> {
        let shared = &self.shared;
        match shared
            .cancellable(actions::fetch_presence(
                shared.api.as_ref(),
                &shared.store,
                user_ids,
            ))
            .await
        {
            Some(result) => Ok(result?),
            None => Ok(()),
        }
    }
}

impl<T: Transport> Drop for ChatSession<T> {
    fn drop(&mut self) {
        self.shared.teardown(true);
        self.task.abort();
    }
}

impl<T: Transport> Shared<T> {
    fn current_user(&self) -> Option<String> {
        lock(&self.user_id).clone()
    }

    fn connect(&self, user_id: &str) {
        {
            let mut state = lock(&self.state);
            if *state != ConnectionState::Disconnected {
                log::debug!("connect({user_id}) ignored while {:?}", *state);
                return;
            }
            *state = ConnectionState::Connecting;
        }
        *lock(&self.user_id) = Some(user_id.to_string());

        let epoch = self.epoch.load(Ordering::SeqCst);
        self.subscribe(epoch);

        log::info!("Connecting chat transport as {user_id}");
        let connected = self.events.clone();
        let disconnected = self.events.clone();
        self.transport.connect(
            user_id,
            Box::new(move || {
                let _ = connected.send(SessionEvent::Connected { epoch });
            }),
            Box::new(move |reason| {
                let _ = disconnected.send(SessionEvent::Disconnected { epoch, reason });
            }),
        );
    }

    fn subscribe(&self, epoch: u64) {
        let mut subscriptions = lock(&self.subscriptions);
        for stale in subscriptions.drain(..) {
            stale.unsubscribe();
        }

        let transport = &self.transport;
        subscriptions.extend([
            transport.on_message(
                SUBSCRIBER_KEY,
                forward(&self.events, epoch, TransportEvent::Message),
            ),
            transport.on_typing(
                SUBSCRIBER_KEY,
                forward(&self.events, epoch, TransportEvent::Typing),
            ),
            transport.on_presence_change(
                SUBSCRIBER_KEY,
                forward(&self.events, epoch, TransportEvent::Presence),
            ),
            transport.on_reaction(
                SUBSCRIBER_KEY,
                forward(&self.events, epoch, TransportEvent::Reaction),
            ),
            transport.on_status(
                SUBSCRIBER_KEY,
                forward(&self.events, epoch, TransportEvent::Status),
            ),
        ]);
    }

    fn teardown(&self, explicit: bool) {
        let previous = std::mem::replace(&mut *lock(&self.state), ConnectionState::Disconnected);
        self.epoch.fetch_add(1, Ordering::SeqCst);

        if explicit {
            self.transport.disconnect();
            self.cancel.send_modify(|generation| *generation += 1);
        }

        let subscriptions: Vec<Unsubscribe> = lock(&self.subscriptions).drain(..).collect();
        for subscription in subscriptions {
            subscription.unsubscribe();
        }

        self.store.dispatch(ChatAction::Connected(false));
        let _ = self.events.send(SessionEvent::CancelTimers);
        if previous != ConnectionState::Disconnected {
            log::info!("Chat session disconnected (was {previous:?})");
        }
    }

    fn schedule_reconnect(&self, delay: Duration) {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let events = self.events.clone();
        log::info!("Reconnecting in {}ms", delay.as_millis());
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(SessionEvent::Reconnect { epoch });
        });
    }

    fn handle_event(&self, event: SessionEvent, typing: &mut TypingTimers) {
        let current = self.epoch.load(Ordering::SeqCst);
        match event {
            SessionEvent::Connected { epoch } if epoch == current => {
                *lock(&self.state) = ConnectionState::Connected;
                self.store.dispatch(ChatAction::Connected(true));
                log::info!("Chat session connected");
            }
            SessionEvent::Disconnected { epoch, reason } if epoch == current => {
                log::warn!(
                    "Chat transport lost: {}",
                    reason.as_deref().unwrap_or("closed")
                );
                typing.cancel_all();
                self.teardown(false);
                if let Some(delay) = self.options.reconnect_delay {
                    self.schedule_reconnect(delay);
                }
            }
            SessionEvent::Inbound { epoch, event } if epoch == current => {
                self.handle_inbound(event, typing);
            }
            SessionEvent::Reconnect { epoch } if epoch == current => {
                if let Some(user_id) = self.current_user() {
                    self.connect(&user_id);
                }
            }
            SessionEvent::CancelTimers => typing.cancel_all(),
            _ => log::debug!("Dropping event from a previous connection"),
        }
    }

    fn handle_inbound(&self, event: TransportEvent, timers: &mut TypingTimers) {
        match event {
            TransportEvent::Message(message) => self.handle_message(message),
            TransportEvent::Typing(TypingEvent {
                user_id, typing, ..
            }) => {
                if typing {
                    timers.start(&user_id);
                } else {
                    timers.stop(&user_id);
                }
                self.store
                    .dispatch(ChatAction::TypingChanged { user_id, typing });
            }
            TransportEvent::Presence(PresenceEvent {
                user_id,
                online,
                last_seen,
            }) => {
                let last_seen = last_seen.or_else(|| (!online).then(Utc::now));
                self.store.dispatch(ChatAction::PresenceChanged {
                    user_id,
                    online,
                    last_seen,
                });
            }
            TransportEvent::Reaction(ReactionEvent {
                message_id,
                reactions,
            }) => {
                if let Some(cache) = &self.options.cache {
                    if let Err(err) = cache.update_reactions(&message_id, &reactions) {
                        log::warn!("Failed to cache reactions for {message_id}: {err}");
                    }
                }
                self.store.dispatch(ChatAction::ReactionsUpdated {
                    message_id,
                    reactions,
                });
            }
            TransportEvent::Status(StatusEvent {
                message_ids,
                status,
            }) => {
                self.cache_status(&message_ids, status);
                self.store.dispatch(ChatAction::StatusUpdated {
                    message_ids,
                    status,
                });
            }
        }
    }

    fn handle_message(&self, message: ChatMessage) {
        let Some(me) = self.current_user() else {
            log::warn!("Message {} arrived with no user, dropping", message.id);
            return;
        };
        let friend_id = message.partner_of(&me).to_string();
        if self
            .store
            .select(|state| state.contains_message(&friend_id, &message.id))
        {
            log::debug!("Duplicate message {} ignored", message.id);
            return;
        }

        let message = message.with_conversation(&me);
        self.cache_message(&message);
        self.store
            .dispatch(ChatAction::MessageReceived(message.clone()));

        if message.sender == me {
            return;
        }
        if self.store.select(|state| state.is_active(&friend_id)) {
            let ids = vec![message.id];
            self.transport.mark_as_read(&ids);
            self.mark_read_locally(&friend_id, ids);
        } else {
            self.store.dispatch(ChatAction::IncrementUnread(friend_id));
        }
    }

    fn mark_read_locally(&self, friend_id: &str, message_ids: Vec<String>) {
        self.cache_status(&message_ids, MessageStatus::Read);
        self.store.dispatch(ChatAction::MessagesRead {
            friend_id: friend_id.to_string(),
            message_ids,
        });
    }

    async fn mark_read_remote(&self, message_ids: &[String]) {
        if self.transport.is_connected() {
            self.transport.mark_as_read(message_ids);
            return;
        }
        if let Some(Err(err)) = self.cancellable(self.api.mark_read(message_ids)).await {
            log::warn!("Mark-read for {} messages failed: {err}", message_ids.len());
        }
    }

    fn hydrate_from_cache(&self, friend_id: &str) {
        let (Some(cache), Some(me)) = (&self.options.cache, self.current_user()) else {
            return;
        };
        match cache.conversation(&me, friend_id, self.options.history_limit) {
            Ok(messages) if !messages.is_empty() => {
                self.store.dispatch(ChatAction::FetchHistorySuccess {
                    friend_id: friend_id.to_string(),
                    messages,
                });
            }
            Ok(_) => {}
            Err(err) => log::warn!("Failed to read cached history for {friend_id}: {err}"),
        }
    }

    fn cache_message(&self, message: &ChatMessage) {
        if let Some(cache) = &self.options.cache {
            if let Err(err) = cache.insert_message(message) {
                log::warn!("Failed to cache message {}: {err}", message.id);
            }
        }
    }

    fn cache_status(&self, message_ids: &[String], status: MessageStatus) {
        if let Some(cache) = &self.options.cache {
            if let Err(err) = cache.update_status(message_ids, status) {
                log::warn!("Failed to cache status update: {err}");
            }
        }
    }

    /// Runs `request` unless the session is disconnected first.
    async fn cancellable<F: Future>(&self, request: F) -> Option<F::Output> {
        let mut cancel = self.cancel.subscribe();
        tokio::select! {
            output = request => Some(output),
            _ = cancel.changed() => {
                log::debug!("Request cancelled by disconnect");
                None
            }
        }
    }
}

async fn run_loop<T: Transport>(
    shared: Arc<Shared<T>>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
) {
    let (expired_tx, mut expired_rx) = mpsc::unbounded_channel();
    let mut typing = TypingTimers::new(shared.options.typing_timeout, expired_tx);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                shared.handle_event(event, &mut typing);
            }
            Some(expired) = expired_rx.recv() => {
                if typing.expire(&expired) {
                    shared.store.dispatch(ChatAction::TypingChanged {
                        user_id: expired.user_id,
                        typing: false,
                    });
                }
            }
        }
    }
}

fn forward<E: 'static>(
    events: &mpsc::UnboundedSender<SessionEvent>,
    epoch: u64,
    wrap: fn(E) -> TransportEvent,
) -> Callback<E> {
    let events = events.clone();
    Arc::new(move |event| {
        if events
            .send(SessionEvent::Inbound {
                epoch,
                event: wrap(event),
            })
            .is_err()
        {
            log::debug!("Session loop gone, dropping event");
        }
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
