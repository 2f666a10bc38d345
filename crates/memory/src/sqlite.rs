//! SQLite conversation store.
//!
//! Two tables:
//! - `conversations`: one row per conversation (id, name, summary)
//! - `messages`: the ordered log, keyed by an autoincrement id
//!
//! All access goes through a bounded sqlx pool; each statement checks a
//! connection out and returns it when done.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use daisy_core::error::StoreError;
use daisy_core::message::{ConversationId, Message, Role};
use daisy_core::store::{ConversationStore, ConversationSummary};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::{debug, info, warn};

/// A SQLite-backed store writing to one active conversation.
pub struct SqliteStore {
    pool: SqlitePool,
    conversation: ConversationId,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub async fn open(
        path: &Path,
        max_connections: u32,
        conversation: ConversationId,
    ) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Storage(format!("Cannot create {}: {e}", parent.display())))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self::from_pool(pool, conversation).await?;
        info!(path = %path.display(), conversation = %store.conversation, "SQLite conversation store ready");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool, conversation: ConversationId) -> Result<Self, StoreError> {
        let store = Self { pool, conversation };
        store.run_migrations().await?;
        store.ensure_conversation().await?;
        Ok(store)
    }

    pub fn conversation(&self) -> &ConversationId {
        &self.conversation
    }

    /// Create tables and indexes.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id       TEXT PRIMARY KEY,
                name     TEXT,
                summary  TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversations table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id  TEXT NOT NULL REFERENCES conversations(id),
                timestamp        TEXT NOT NULL,
                role             TEXT NOT NULL,
                content          TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversation index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    async fn ensure_conversation(&self) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO conversations (id) VALUES (?)")
            .bind(&self.conversation.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("create conversation: {e}")))?;
        Ok(())
    }

    /// Parse a `Message` from a SQLite row.
    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StoreError> {
        let role_str: String = row
            .try_get("role")
            .map_err(|e| StoreError::QueryFailed(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StoreError::QueryFailed(format!("content column: {e}")))?;
        let timestamp_str: String = row
            .try_get("timestamp")
            .map_err(|e| StoreError::QueryFailed(format!("timestamp column: {e}")))?;

        let role = Role::parse(&role_str).unwrap_or_else(|| {
            warn!(role = %role_str, "Unknown stored role, treating as user");
            Role::User
        });

        let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
            .map(|dt| dt.with_timezone(&Utc))
            .ok();

        Ok(Message {
            role,
            content,
            timestamp,
        })
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append(&self, message: &Message) -> Result<(), StoreError> {
        let timestamp = message.timestamp.unwrap_or_else(Utc::now).to_rfc3339();

        sqlx::query(
            "INSERT INTO messages (conversation_id, timestamp, role, content) VALUES (?, ?, ?, ?)",
        )
        .bind(&self.conversation.0)
        .bind(timestamp)
        .bind(message.role.as_str())
        .bind(&message.content)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("append message: {e}")))?;

        debug!(role = %message.role, chars = message.content.len(), "Stored message");
        Ok(())
    }

    async fn recent(&self, n: usize) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            "SELECT role, content, timestamp FROM messages WHERE conversation_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(&self.conversation.0)
        .bind(i64::try_from(n).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("recent messages: {e}")))?;

        let mut messages = rows
            .iter()
            .map(Self::row_to_message)
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn describe(&self, name: &str, summary: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE conversations SET name = ?, summary = ? WHERE id = ?")
            .bind(name)
            .bind(summary)
            .bind(&self.conversation.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("describe conversation: {e}")))?;
        debug!(name, "Described conversation");
        Ok(())
    }

    async fn conversations(&self) -> Result<Vec<ConversationSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.name, c.summary, COUNT(m.id) AS message_count
            FROM conversations c
            LEFT JOIN messages m ON m.conversation_id = c.id
            GROUP BY c.id
            ORDER BY c.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("list conversations: {e}")))?;

        rows.iter()
            .map(|row| {
                let id: String = row
                    .try_get("id")
                    .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
                let count: i64 = row.try_get("message_count").unwrap_or(0);
                Ok(ConversationSummary {
                    id: ConversationId(id),
                    name: row.try_get("name").unwrap_or(None),
                    summary: row.try_get("summary").unwrap_or(None),
                    message_count: usize::try_from(count).unwrap_or(0),
                })
            })
            .collect()
    }
}
