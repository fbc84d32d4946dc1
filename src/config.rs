use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "config/chat.json";
pub const DEFAULT_TYPING_TIMEOUT_MS: u64 = 3000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the REST backend, e.g. `http://localhost:8080`.
    pub api_base_url: String,
    /// WebSocket endpoint for push events.
    pub ws_url: String,
    pub typing_timeout_ms: u64,
    pub request_timeout_secs: u64,
    /// Where the bearer token is persisted between runs.
    pub token_file: Option<PathBuf>,
    /// SQLite file for the local message cache; no cache when unset.
    pub cache_path: Option<PathBuf>,
    /// Delay before reconnecting a dropped socket; `null` disables reconnects.
    pub reconnect_delay_ms: Option<u64>,
    /// Max cached messages shown when a conversation opens.
    pub history_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            ws_url: "ws://localhost:8080/ws/chat".to_string(),
            typing_timeout_ms: DEFAULT_TYPING_TIMEOUT_MS,
            request_timeout_secs: 15,
            token_file: Some(PathBuf::from("data/token")),
            cache_path: Some(PathBuf::from("data/messages.db")),
            reconnect_delay_ms: Some(2000),
            history_limit: 200,
        }
    }
}

impl AppConfig {
    pub fn typing_timeout(&self) -> Duration {
        Duration::from_millis(self.typing_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Applies `CHAT_API_URL` / `CHAT_WS_URL` overrides.
    pub fn apply_env(mut self) -> Self {
        if let Ok(url) = std::env::var("CHAT_API_URL") {
            self.api_base_url = url;
        }
        if let Ok(url) = std::env::var("CHAT_WS_URL") {
            self.ws_url = url;
        }
        self
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

pub fn save_config(path: &str, config: &AppConfig) -> std::io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)
}
