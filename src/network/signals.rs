use tokio::sync::broadcast;

/// App-wide signals raised deep inside the network layer and handled at the top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppSignal {
    /// 401: the token was cleared, the user must log in again.
    SessionExpired,
    Forbidden(String),
    NotFound(String),
    ServerError { status: u16, message: String },
}

/// Pub/sub channel for [`AppSignal`]. Clones publish into the same channel.
#[derive(Clone)]
pub struct SignalBus {
    sender: broadcast::Sender<AppSignal>,
}

impl SignalBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, signal: AppSignal) {
        // No receiver is not an error: nobody is listening yet.
        if self.sender.send(signal.clone()).is_err() {
            log::debug!("No listener for {signal:?}");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppSignal> {
        self.sender.subscribe()
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new(32)
    }
}
