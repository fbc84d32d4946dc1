pub mod actions;
pub mod reducer;
pub mod state;

pub use actions::ChatAction;
pub use reducer::reduce;
pub use state::ChatState;

use std::sync::Arc;

use tokio::sync::watch;

/// Shared handle to the chat state. Cloning is cheap; every clone sees the
/// same state. Subscribers are woken after each dispatch.
#[derive(Clone)]
pub struct Store {
    state: Arc<watch::Sender<ChatState>>,
}

impl Store {
    pub fn new() -> Self {
        Self::with_state(ChatState::default())
    }

    pub fn with_state(state: ChatState) -> Self {
        let (sender, _) = watch::channel(state);
        Self {
            state: Arc::new(sender),
        }
    }

    pub fn dispatch(&self, action: ChatAction) {
        log::trace!("dispatch {action:?}");
        self.state.send_modify(|state| {
            let current = std::mem::take(state);
            *state = reduce(current, action);
        });
    }

    pub fn snapshot(&self) -> ChatState {
        self.state.borrow().clone()
    }

    /// Reads a derived value without cloning the whole state.
    pub fn select<R>(&self, selector: impl FnOnce(&ChatState) -> R) -> R {
        selector(&self.state.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
