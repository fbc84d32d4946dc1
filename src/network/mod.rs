pub mod api_client;
pub mod protocol;
pub mod registry;
pub mod signals;
pub mod transport;

pub use api_client::{ApiError, ChatApi, HttpChatApi, TokenStore};
pub use registry::{Callback, SubscriberRegistry, Unsubscribe};
pub use signals::{AppSignal, SignalBus};
pub use transport::{ConnectCallback, DisconnectCallback, Transport, WsTransport};
