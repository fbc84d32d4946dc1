use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use rust_social_chat::chat::{ChatSession, SessionOptions};
use rust_social_chat::config;
use rust_social_chat::network::{HttpChatApi, SignalBus, TokenStore, Transport, WsTransport};
use rust_social_chat::storage;
use rust_social_chat::store::Store;
use rust_social_chat::ui::ConsoleApp;

#[derive(Parser)]
#[command(
    name = "rust_social_chat",
    version,
    about = "Terminal client for one-to-one social chat"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Id of the logged-in user
    #[arg(long, env = "CHAT_USER")]
    user: String,
    /// Bearer token; replaces the stored one
    #[arg(long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    // Khởi tạo Logger để debug
    env_logger::init();

    let cli = Cli::parse();
    let app_config = config::load_config(&cli.config);
    if !std::path::Path::new(&cli.config).exists() {
        if let Err(err) = config::save_config(&cli.config, &app_config) {
            log::warn!("Failed to write default config to {}: {err}", cli.config);
        }
    }
    let app_config = app_config.apply_env();

    // 1. Token: file lưu trữ, rồi biến môi trường / tham số dòng lệnh
    let tokens = Arc::new(match &app_config.token_file {
        Some(path) => TokenStore::load(path.clone()),
        None => TokenStore::in_memory(None),
    });
    if let Some(token) = cli.token.or_else(|| std::env::var("CHAT_TOKEN").ok()) {
        tokens.set(token);
    }

    // 2. REST + WebSocket
    let signals = SignalBus::default();
    let api = HttpChatApi::new(
        &app_config.api_base_url,
        tokens.clone(),
        signals.clone(),
        app_config.request_timeout(),
    )?;
    let transport = Arc::new(WsTransport::new(&app_config.ws_url, tokens));

    // 3. Cache tin nhắn cục bộ (không bắt buộc)
    let mut options = SessionOptions::from_config(&app_config);
    if let Some(path) = &app_config.cache_path {
        match storage::open_cache(path) {
            Ok(cache) => options = options.with_cache(Arc::new(cache)),
            Err(err) => log::warn!("Message cache disabled: {err}"),
        }
    }

    let session = ChatSession::new(transport, Arc::new(api), Store::new(), options);
    let signal_rx = signals.subscribe();
    session.connect(&cli.user);
    if let Err(err) = session.fetch_conversations().await {
        log::warn!("Failed to load conversations: {err}");
    }
    log::info!(
        "Client started as {} (socket {})",
        cli.user,
        if session.transport().is_connected() { "up" } else { "connecting" }
    );

    ConsoleApp::new(session, &cli.user).run(signal_rx).await;
    Ok(())
}
