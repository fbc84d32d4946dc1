use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use crate::common::{
    ChatMessage, PresenceEvent, ReactionEvent, StatusEvent, TransportEvent, TypingEvent,
};

pub type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    Typing,
    Presence,
    Reaction,
    Status,
}

impl EventKind {
    fn of(event: &TransportEvent) -> Self {
        match event {
            TransportEvent::Message(_) => Self::Message,
            TransportEvent::Typing(_) => Self::Typing,
            TransportEvent::Presence(_) => Self::Presence,
            TransportEvent::Reaction(_) => Self::Reaction,
            TransportEvent::Status(_) => Self::Status,
        }
    }
}

/// Handle returned by every `on_*` registration. Dropping it leaves the
/// callback registered; call [`Unsubscribe::unsubscribe`] to remove it.
#[must_use = "dropping an Unsubscribe keeps the callback registered"]
pub struct Unsubscribe(Option<Box<dyn FnOnce() + Send>>);

impl Unsubscribe {
    pub fn new(remove: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(remove)))
    }

    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.0.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Unsubscribe")
            .field(&self.0.is_some())
            .finish()
    }
}

struct Slot {
    token: u64,
    callback: Callback<TransportEvent>,
}

#[derive(Default)]
struct Subscribers {
    active: bool,
    slots: HashMap<(EventKind, String), Slot>,
}

/// Keyed subscriber table shared by transports.
///
/// Registering twice under the same key replaces the earlier callback; the
/// earlier `Unsubscribe` handle becomes inert. Callbacks run while the table
/// is read-locked, so a callback must not register or unsubscribe itself.
/// Once [`deactivate`](Self::deactivate) returns no callback runs until the
/// registry is activated again.
#[derive(Default)]
pub struct SubscriberRegistry {
    inner: RwLock<Subscribers>,
    next_token: AtomicU64,
}

impl SubscriberRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn activate(&self) {
        self.write().active = true;
    }

    pub fn deactivate(&self) {
        self.write().active = false;
    }

    pub fn is_active(&self) -> bool {
        self.read().active
    }

    pub fn len(&self) -> usize {
        self.read().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn on_message(
        self: &Arc<Self>,
        key: &str,
        callback: impl Fn(ChatMessage) + Send + Sync + 'static,
    ) -> Unsubscribe {
        self.register(EventKind::Message, key, move |event| {
            if let TransportEvent::Message(message) = event {
                callback(message);
            }
        })
    }

    pub fn on_typing(
        self: &Arc<Self>,
        key: &str,
        callback: impl Fn(TypingEvent) + Send + Sync + 'static,
    ) -> Unsubscribe {
        self.register(EventKind::Typing, key, move |event| {
            if let TransportEvent::Typing(typing) = event {
                callback(typing);
            }
        })
    }

    pub fn on_presence_change(
        self: &Arc<Self>,
        key: &str,
        callback: impl Fn(PresenceEvent) + Send + Sync + 'static,
    ) -> Unsubscribe {
        self.register(EventKind::Presence, key, move |event| {
            if let TransportEvent::Presence(presence) = event {
                callback(presence);
            }
        })
    }

    pub fn on_reaction(
        self: &Arc<Self>,
        key: &str,
        callback: impl Fn(ReactionEvent) + Send + Sync + 'static,
    ) -> Unsubscribe {
        self.register(EventKind::Reaction, key, move |event| {
            if let TransportEvent::Reaction(reaction) = event {
                callback(reaction);
            }
        })
    }

    pub fn on_status(
        self: &Arc<Self>,
        key: &str,
        callback: impl Fn(StatusEvent) + Send + Sync + 'static,
    ) -> Unsubscribe {
        self.register(EventKind::Status, key, move |event| {
            if let TransportEvent::Status(status) = event {
                callback(status);
            }
        })
    }

    /// Delivers `event` to every subscriber of its kind. Returns how many
    /// callbacks ran; zero while the registry is inactive.
    pub fn dispatch(&self, event: TransportEvent) -> usize {
        let kind = EventKind::of(&event);
        let subscribers = self.read();
        if !subscribers.active {
            log::debug!("Registry inactive, dropping {kind:?} event");
            return 0;
        }

        let mut delivered = 0;
        for ((slot_kind, _), slot) in subscribers.slots.iter() {
            if *slot_kind == kind {
                (slot.callback)(event.clone());
                delivered += 1;
            }
        }
        delivered
    }

    fn register(
        self: &Arc<Self>,
        kind: EventKind,
        key: &str,
        callback: impl Fn(TransportEvent) + Send + Sync + 'static,
    ) -> Unsubscribe {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let slot_key = (kind, key.to_string());
        let previous = self.write().slots.insert(
            slot_key.clone(),
            Slot {
                token,
                callback: Arc::new(callback),
            },
        );
        if previous.is_some() {
            log::debug!("Replaced {kind:?} subscriber `{key}`");
        }

        let registry: Weak<Self> = Arc::downgrade(self);
        Unsubscribe::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.remove(&slot_key, token);
            }
        })
    }

    fn remove(&self, slot_key: &(EventKind, String), token: u64) {
        let mut subscribers = self.write();
        if subscribers
            .slots
            .get(slot_key)
            .is_some_and(|slot| slot.token == token)
        {
            subscribers.slots.remove(slot_key);
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Subscribers> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Subscribers> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
