/// Lệnh UI gửi xuống phiên chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Plain text for the open conversation.
    Send(String),
    Open(String),
    Close,
    Typing,
    React {
        message_id: String,
        emoji: String,
    },
    Conversations,
    Presence(Vec<String>),
    Quit,
}

impl ChatCommand {
    /// Parses one line of terminal input. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if !line.starts_with('/') {
            return Some(Self::Send(line.to_string()));
        }

        let mut parts = line.split_whitespace();
        let verb = parts.next()?;
        let command = match verb {
            "/open" => Self::Open(parts.next()?.to_string()),
            "/close" => Self::Close,
            "/typing" => Self::Typing,
            "/react" => Self::React {
                message_id: parts.next()?.to_string(),
                emoji: parts.next()?.to_string(),
            },
            "/conversations" => Self::Conversations,
            "/presence" => Self::Presence(parts.map(str::to_string).collect()),
            "/quit" | "/exit" => Self::Quit,
            _ => return None,
        };
        Some(command)
    }
}
