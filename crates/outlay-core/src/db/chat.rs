//! Chat history

use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{ChatMessage, ChatRole};

impl Database {
    /// Append a chat turn
    pub fn append_chat_message(&self, role: ChatRole, content: &str) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO chat_messages (role, content) VALUES (?, ?)",
            params![role.as_str(), content],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The most recent `limit` chat turns, oldest first
    pub fn recent_chat_messages(&self, limit: usize) -> Result<Vec<ChatMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, role, content, created_at FROM (
                SELECT id, role, content, created_at FROM chat_messages
                ORDER BY id DESC
                LIMIT ?
            ) ORDER BY id ASC
            "#,
        )?;

        let messages = stmt
            .query_map(params![limit as i64], |row| {
                let role_str: String = row.get(1)?;
                let created_at_str: String = row.get(3)?;
                Ok(ChatMessage {
                    id: row.get(0)?,
                    role: role_str.parse().unwrap_or(ChatRole::User),
                    content: row.get(2)?,
                    created_at: parse_datetime(&created_at_str),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    /// Delete all chat history, returning the number of removed turns
    pub fn clear_chat_history(&self) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM chat_messages", [])?;
        Ok(deleted)
    }
}
