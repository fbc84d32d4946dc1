use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Fired when a typing indicator's quiet period elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingExpired {
    pub user_id: String,
    pub generation: u64,
}

/// Per-user debounce timers for inbound typing indicators.
///
/// Each `start` re-arms the user's timer; only the newest arm may expire,
/// older ones are aborted and, should one still slip through, rejected by
/// generation in [`TypingTimers::expire`].
pub struct TypingTimers {
    timeout: Duration,
    expired: mpsc::UnboundedSender<TypingExpired>,
    timers: HashMap<String, (u64, JoinHandle<()>)>,
    next_generation: u64,
}

impl TypingTimers {
    pub fn new(timeout: Duration, expired: mpsc::UnboundedSender<TypingExpired>) -> Self {
        Self {
            timeout,
            expired,
            timers: HashMap::new(),
            next_generation: 0,
        }
    }

    pub fn start(&mut self, user_id: &str) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let deadline = tokio::time::Instant::now() + self.timeout;
        let expired = self.expired.clone();
        let user = user_id.to_string();

        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = expired.send(TypingExpired {
                user_id: user,
                generation,
            });
        });

        if let Some((_, previous)) = self
            .timers
            .insert(user_id.to_string(), (generation, handle))
        {
            previous.abort();
        }
    }

    /// Cancels the user's pending timer. Returns whether one was armed.
    pub fn stop(&mut self, user_id: &str) -> bool {
        match self.timers.remove(user_id) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Accepts an expiry only if it belongs to the newest arm for that user.
    pub fn expire(&mut self, expired: &TypingExpired) -> bool {
        let current = self
            .timers
            .get(&expired.user_id)
            .is_some_and(|(generation, _)| *generation == expired.generation);
        if current {
            self.timers.remove(&expired.user_id);
        }
        current
    }

    pub fn is_pending(&self, user_id: &str) -> bool {
        self.timers.contains_key(user_id)
    }

    pub fn cancel_all(&mut self) {
        for (_, (_, handle)) in self.timers.drain() {
            handle.abort();
        }
    }
}

impl Drop for TypingTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
