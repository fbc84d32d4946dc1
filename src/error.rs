use thiserror::Error;

use crate::network::api_client::ApiError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Session is not connected")]
    NotConnected,

    #[error("No conversation is open")]
    NoActiveConversation,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
