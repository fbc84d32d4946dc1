use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use crate::common::{
    ChatMessage, PresenceEvent, ReactionEvent, StatusEvent, TargetType, TypingEvent,
};
use crate::error::{Error, Result};

use super::api_client::TokenStore;
use super::protocol::{ClientFrame, ServerFrame};
use super::registry::{Callback, SubscriberRegistry, Unsubscribe};

pub type ConnectCallback = Box<dyn FnOnce() + Send>;
/// Receives the failure reason, if any.
pub type DisconnectCallback = Box<dyn FnOnce(Option<String>) + Send>;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Push connection used by the chat session.
///
/// Implementors provide the connection lifecycle, a subscriber registry and
/// a raw frame sink; the typed subscribe/send helpers are shared. Sends are
/// fire-and-forget: when the link is down the frame is dropped.
pub trait Transport: Send + Sync + 'static {
    /// Opens the link for `user_id`. Exactly one of the callbacks fires once
    /// the outcome is known; `on_disconnect` also fires if an established
    /// link drops later. Not fired after [`Transport::disconnect`].
    fn connect(&self, user_id: &str, on_connect: ConnectCallback, on_disconnect: DisconnectCallback);

    /// Closes the link. No subscriber callback fires after this returns.
    fn disconnect(&self);

    fn is_connected(&self) -> bool;

    fn registry(&self) -> &Arc<SubscriberRegistry>;

    fn send_frame(&self, frame: ClientFrame);

    fn on_message(&self, key: &str, callback: Callback<ChatMessage>) -> Unsubscribe {
        self.registry().on_message(key, move |message| callback(message))
    }

    fn on_typing(&self, key: &str, callback: Callback<TypingEvent>) -> Unsubscribe {
        self.registry().on_typing(key, move |event| callback(event))
    }

    fn on_presence_change(&self, key: &str, callback: Callback<PresenceEvent>) -> Unsubscribe {
        self.registry()
            .on_presence_change(key, move |event| callback(event))
    }

    fn on_reaction(&self, key: &str, callback: Callback<ReactionEvent>) -> Unsubscribe {
        self.registry().on_reaction(key, move |event| callback(event))
    }

    fn on_status(&self, key: &str, callback: Callback<StatusEvent>) -> Unsubscribe {
        self.registry().on_status(key, move |event| callback(event))
    }

    fn send_message(&self, recipient_id: &str, content: &str, reply_to_id: Option<&str>) {
        self.send_frame(ClientFrame::Message {
            client_id: Uuid::new_v4().to_string(),
            recipient_id: recipient_id.to_string(),
            content: content.to_string(),
            reply_to_id: reply_to_id.map(str::to_string),
        });
    }

    fn send_typing_start(&self, target_id: &str, target_type: TargetType) {
        self.send_frame(ClientFrame::TypingStart {
            target_id: target_id.to_string(),
            target_type,
        });
    }

    fn send_typing_stop(&self, target_id: &str, target_type: TargetType) {
        self.send_frame(ClientFrame::TypingStop {
            target_id: target_id.to_string(),
            target_type,
        });
    }

    fn send_reaction(&self, message_id: &str, reaction: &str) {
        self.send_frame(ClientFrame::Reaction {
            message_id: message_id.to_string(),
            reaction: reaction.to_string(),
        });
    }

    fn mark_as_read(&self, message_ids: &[String]) {
        if message_ids.is_empty() {
            return;
        }
        self.send_frame(ClientFrame::MarkRead {
            message_ids: message_ids.to_vec(),
        });
    }
}

struct ActiveLink {
    user_id: String,
    outbound: mpsc::UnboundedSender<ClientFrame>,
    connected: Arc<AtomicBool>,
    /// Set once the link task has given up, before `on_disconnect` runs.
    closed: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// WebSocket transport over `tokio-tungstenite`, one link at a time.
pub struct WsTransport {
    url: String,
    tokens: Arc<TokenStore>,
    registry: Arc<SubscriberRegistry>,
    link: Mutex<Option<ActiveLink>>,
}

impl WsTransport {
    pub fn new(url: &str, tokens: Arc<TokenStore>) -> Self {
        Self {
            url: url.to_string(),
            tokens,
            registry: SubscriberRegistry::new(),
            link: Mutex::new(None),
        }
    }

    fn link(&self) -> std::sync::MutexGuard<'_, Option<ActiveLink>> {
        self.link.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Transport for WsTransport {
    fn connect(&self, user_id: &str, on_connect: ConnectCallback, on_disconnect: DisconnectCallback) {
        let mut link = self.link();

        let same_user = link
            .as_ref()
            .filter(|active| active.user_id == user_id && !active.closed.load(Ordering::SeqCst))
            .map(|active| active.connected.load(Ordering::SeqCst));
        match same_user {
            Some(true) => {
                drop(link);
                log::debug!("Already connected as {user_id}");
                on_connect();
                return;
            }
            Some(false) => {
                log::debug!("Connection for {user_id} already in progress");
                return;
            }
            None => {}
        }

        if let Some(previous) = link.take() {
            log::info!("Replacing chat link for {}", previous.user_id);
            previous.task.abort();
            self.registry.deactivate();
        }

        let request = match build_request(&self.url, user_id, self.tokens.get()) {
            Ok(request) => request,
            Err(err) => {
                drop(link);
                on_disconnect(Some(err.to_string()));
                return;
            }
        };

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_link(
            request,
            outbound_rx,
            self.registry.clone(),
            connected.clone(),
            closed.clone(),
            on_connect,
            on_disconnect,
        ));

        *link = Some(ActiveLink {
            user_id: user_id.to_string(),
            outbound,
            connected,
            closed,
            task,
        });
    }

    fn disconnect(&self) {
        if let Some(active) = self.link().take() {
            active.closed.store(true, Ordering::SeqCst);
            active.connected.store(false, Ordering::SeqCst);
            active.task.abort();
            log::info!("Chat link for {} closed", active.user_id);
        }
        self.registry.deactivate();
    }

    fn is_connected(&self) -> bool {
        self.link()
            .as_ref()
            .is_some_and(|active| active.connected.load(Ordering::SeqCst))
    }

    fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    fn send_frame(&self, frame: ClientFrame) {
        let link = self.link();
        match link.as_ref() {
            Some(active) if active.connected.load(Ordering::SeqCst) => {
                if let Err(err) = active.outbound.send(frame) {
                    log::debug!("Link closed, dropping {:?}", err.0);
                }
            }
            _ => log::debug!("Not connected, dropping {frame:?}"),
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(active) = self.link().take() {
            active.task.abort();
        }
    }
}

fn build_request(url: &str, user_id: &str, token: Option<String>) -> Result<Request> {
    let mut url = reqwest::Url::parse(url)
        .map_err(|err| Error::Transport(format!("invalid socket url `{url}`: {err}")))?;
    url.query_pairs_mut().append_pair("userId", user_id);

    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|err| Error::Transport(err.to_string()))?;
    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|err| Error::Transport(format!("invalid token: {err}")))?;
        request.headers_mut().insert("Authorization", value);
    }
    Ok(request)
}

async fn run_link(
    request: Request,
    outbound: mpsc::UnboundedReceiver<ClientFrame>,
    registry: Arc<SubscriberRegistry>,
    connected: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    on_connect: ConnectCallback,
    on_disconnect: DisconnectCallback,
) {
    let stream = match tokio_tungstenite::connect_async(request).await {
        Ok((stream, _response)) => stream,
        Err(err) => {
            log::warn!("Chat socket connect failed: {err}");
            closed.store(true, Ordering::SeqCst);
            on_disconnect(Some(err.to_string()));
            return;
        }
    };

    if !open_link(&registry, &connected, &closed) {
        log::debug!("Chat link closed during handshake, dropping socket");
        return;
    }
    log::info!("Chat socket connected");
    on_connect();

    let reason = pump(stream, outbound, &registry).await;

    connected.store(false, Ordering::SeqCst);
    closed.store(true, Ordering::SeqCst);
    registry.deactivate();
    log::info!("Chat socket disconnected: {}", reason.as_deref().unwrap_or("closed"));
    on_disconnect(reason);
}

/// Activates delivery for a freshly opened socket unless the link was
/// closed meanwhile. `disconnect` sets `closed` before deactivating, so
/// checking again after `activate` covers a close that lands in between.
fn open_link(registry: &SubscriberRegistry, connected: &AtomicBool, closed: &AtomicBool) -> bool {
    if closed.load(Ordering::SeqCst) {
        return false;
    }
    registry.activate();
    if closed.load(Ordering::SeqCst) {
        registry.deactivate();
        return false;
    }
    connected.store(true, Ordering::SeqCst);
    true
}

async fn pump(
    stream: WsStream,
    mut outbound: mpsc::UnboundedReceiver<ClientFrame>,
    registry: &SubscriberRegistry,
) -> Option<String> {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = sink.close().await;
                    return None;
                };
                match frame.encode() {
                    Ok(text) => {
                        if let Err(err) = sink.send(Message::Text(text)).await {
                            log::warn!("Send failed, dropping {frame:?}: {err}");
                            return Some(err.to_string());
                        }
                    }
                    Err(err) => log::warn!("Failed to encode {frame:?}: {err}"),
                }
            }
            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => deliver(&text, registry),
                Some(Ok(Message::Close(frame))) => {
                    return Some(
                        frame
                            .map(|close| close.reason.to_string())
                            .filter(|reason| !reason.is_empty())
                            .unwrap_or_else(|| "closed by server".to_string()),
                    );
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return Some(err.to_string()),
                None => return Some("connection reset".to_string()),
            }
        }
    }
}

fn deliver(text: &str, registry: &SubscriberRegistry) {
    match ServerFrame::decode(text) {
        Ok(frame) => {
            if let Some(event) = frame.into_event() {
                registry.dispatch(event);
            }
        }
        Err(err) => log::warn!("Skipping malformed frame ({err}): {text}"),
    }
}
