use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use crate::chat::ChatSession;
use crate::common::ChatCommand;
use crate::error::Error;
use crate::network::{AppSignal, Transport};
use crate::store::{ChatAction, ChatState};

use super::components::{sidebar, status_bar};
use super::state::ViewState;

/// Terminal front-end: reads commands from stdin and prints store changes.
pub struct ConsoleApp<T: Transport> {
    session: ChatSession<T>,
    view: ViewState,
    user_id: String,
}

impl<T: Transport> ConsoleApp<T> {
    pub fn new(session: ChatSession<T>, user_id: &str) -> Self {
        Self {
            session,
            view: ViewState::new(),
            user_id: user_id.to_string(),
        }
    }

    pub async fn run(mut self, mut signals: broadcast::Receiver<AppSignal>) {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut changes = self.session.store().subscribe();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => break,
                        Err(err) => {
                            log::error!("Failed to read stdin: {err}");
                            break;
                        }
                    };
                    let Some(command) = ChatCommand::parse(&line) else {
                        continue;
                    };
                    if !self.handle_command(command).await {
                        break;
                    }
                }
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = changes.borrow_and_update().clone();
                    self.render(&state);
                }
                signal = signals.recv() => match signal {
                    Ok(signal) => {
                        println!("{}", status_bar::signal(&signal));
                        if signal == AppSignal::SessionExpired {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("Missed {skipped} app signals");
                    }
                    Err(broadcast::error::RecvError::Closed) => {}
                }
            }
        }

        self.session.disconnect();
    }

    /// Returns `false` when the app should exit.
    pub async fn handle_command(&mut self, command: ChatCommand) -> bool {
        let active = self
            .session
            .store()
            .select(|state| state.active_conversation.clone());

        match command {
            ChatCommand::Quit => return false,
            ChatCommand::Send(content) => match active {
                Some(friend) => {
                    self.session.stop_typing(&friend);
                    if let Err(err) = self.session.send_message(&friend, &content, None).await {
                        println!("{}", status_bar::error(&err.to_string()));
                    }
                }
                None => println!("{}", status_bar::error(&Error::NoActiveConversation.to_string())),
            },
            ChatCommand::Open(friend) => self.session.select_conversation(&friend).await,
            ChatCommand::Close => self.session.close_conversation(),
            ChatCommand::Typing => match active {
                Some(friend) => self.session.start_typing(&friend),
                None => println!("{}", status_bar::error(&Error::NoActiveConversation.to_string())),
            },
            ChatCommand::React { message_id, emoji } => {
                self.session.add_reaction(&message_id, &emoji);
            }
            ChatCommand::Conversations => {
                if let Err(err) = self.session.fetch_conversations().await {
                    log::warn!("Failed to load conversations: {err}");
                }
                let state = self.session.store().snapshot();
                for line in sidebar::render(&state, chrono::Utc::now()) {
                    println!("{line}");
                }
            }
            ChatCommand::Presence(user_ids) => {
                if let Err(err) = self.session.refresh_presence(&user_ids).await {
                    log::warn!("Failed to refresh presence: {err}");
                }
            }
        }
        true
    }

    fn render(&mut self, state: &ChatState) {
        for line in self.view.update(&self.user_id, state) {
            println!("{line}");
        }
        // Đã hiển thị lỗi, xoá để lần sau lỗi giống hệt vẫn được in.
        if state.error.is_some() {
            self.session.store().dispatch(ChatAction::ClearError);
        }
    }
}
