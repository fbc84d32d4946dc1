use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Result as SqlResult, Row, params};

use crate::common::{ChatMessage, MessageStatus, Reaction};

use super::database::Database;

/// Local copy of one-to-one messages, keyed by message id.
pub struct MessageCache {
    db: Mutex<Database>,
}

impl MessageCache {
    pub fn with_path<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        Self::init(Database::open(path)?)
    }

    pub fn in_memory() -> SqlResult<Self> {
        Self::init(Database::in_memory()?)
    }

    fn init(db: Database) -> SqlResult<Self> {
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns `false` when a message with the same id was already stored.
    pub fn insert_message(&self, message: &ChatMessage) -> SqlResult<bool> {
        let reactions = serde_json::to_string(&message.reactions)
            .map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))?;
        let inserted = self.conn().connection().execute(
            "INSERT OR IGNORE INTO messages
                (id, sender, recipient, content, status, reply_to_id, reactions, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                message.id,
                message.sender,
                message.recipient,
                message.content,
                status_rank(message.status),
                message.reply_to_id,
                reactions,
                message.timestamp.timestamp_millis(),
            ],
        )?;
        Ok(inserted == 1)
    }

    /// Latest `limit` messages between `user_id` and `friend_id`, oldest first.
    pub fn conversation(
        &self,
        user_id: &str,
        friend_id: &str,
        limit: usize,
    ) -> SqlResult<Vec<ChatMessage>> {
        let db = self.conn();
        let mut stmt = db.connection().prepare(
            "SELECT id, sender, recipient, content, status, reply_to_id, reactions, timestamp
             FROM (
                SELECT * FROM messages
                WHERE (sender = ?1 AND recipient = ?2) OR (sender = ?2 AND recipient = ?1)
                ORDER BY timestamp DESC
                LIMIT ?3
             )
             ORDER BY timestamp ASC",
        )?;

        let messages = stmt
            .query_map(params![user_id, friend_id, limit as i64], |row| {
                read_message(row, friend_id)
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(messages)
    }

    /// Moves messages forward to `status`; never backwards.
    pub fn update_status(&self, message_ids: &[String], status: MessageStatus) -> SqlResult<usize> {
        let mut db = self.conn();
        let tx = db.connection_mut().transaction()?;
        let mut updated = 0;
        {
            let mut stmt =
                tx.prepare("UPDATE messages SET status = ?1 WHERE id = ?2 AND status < ?1")?;
            for id in message_ids {
                updated += stmt.execute(params![status_rank(status), id])?;
            }
        }
        tx.commit()?;
        Ok(updated)
    }

    pub fn update_reactions(&self, message_id: &str, reactions: &[Reaction]) -> SqlResult<()> {
        let reactions = serde_json::to_string(reactions)
            .map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))?;
        self.conn().connection().execute(
            "UPDATE messages SET reactions = ?1 WHERE id = ?2",
            params![reactions, message_id],
        )?;
        Ok(())
    }

    pub fn message_count(&self) -> SqlResult<usize> {
        let db = self.conn();
        let count: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn status_rank(status: MessageStatus) -> i64 {
    match status {
        MessageStatus::Sent => 0,
        MessageStatus::Delivered => 1,
        MessageStatus::Read => 2,
    }
}

fn status_from_rank(rank: i64) -> MessageStatus {
    match rank {
        2 => MessageStatus::Read,
        1 => MessageStatus::Delivered,
        _ => MessageStatus::Sent,
    }
}

fn read_message(row: &Row<'_>, friend_id: &str) -> SqlResult<ChatMessage> {
    let reactions: String = row.get(6)?;
    let millis: i64 = row.get(7)?;
    Ok(ChatMessage {
        id: row.get(0)?,
        sender: row.get(1)?,
        recipient: row.get(2)?,
        content: row.get(3)?,
        status: status_from_rank(row.get(4)?),
        reply_to_id: row.get(5)?,
        reactions: serde_json::from_str(&reactions).unwrap_or_default(),
        conversation_id: Some(friend_id.to_string()),
        timestamp: DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default(),
    })
}
