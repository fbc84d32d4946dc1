pub mod database;
pub mod message_cache;

pub use message_cache::MessageCache;

use std::fs;
use std::path::Path;

/// Opens the message cache, creating its parent directory if needed.
pub fn open_cache(path: &Path) -> crate::Result<MessageCache> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(MessageCache::with_path(path)?)
}
