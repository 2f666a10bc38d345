//! Conversation persistence.
//!
//! The engine only writes at well-defined points (the user's turn, tool
//! output, reasoning steps, the final answer), never mid-stream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::message::{ConversationId, Message};

/// One row of the conversation listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub name: Option<String>,
    pub summary: Option<String>,
    pub message_count: usize,
}

/// Append-only message log for a single active conversation.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Persist a message at the end of the active conversation.
    async fn append(&self, message: &Message) -> std::result::Result<(), StoreError>;

    /// The last `n` messages of the active conversation, oldest first.
    async fn recent(&self, n: usize) -> std::result::Result<Vec<Message>, StoreError>;

    /// Set the display name and summary of the active conversation.
    /// Stores without a conversation index ignore it.
    async fn describe(&self, _name: &str, _summary: &str) -> std::result::Result<(), StoreError> {
        Ok(())
    }

    /// All known conversations.
    async fn conversations(&self) -> std::result::Result<Vec<ConversationSummary>, StoreError> {
        Ok(Vec::new())
    }
}
