//! In-memory store, useful for testing and ephemeral sessions.

use async_trait::async_trait;
use daisy_core::error::StoreError;
use daisy_core::message::{ConversationId, Message};
use daisy_core::store::{ConversationStore, ConversationSummary};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps one conversation's messages in a Vec.
pub struct InMemoryStore {
    id: ConversationId,
    messages: Arc<RwLock<Vec<Message>>>,
    description: RwLock<(Option<String>, Option<String>)>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            id: ConversationId::from("default"),
            messages: Arc::new(RwLock::new(Vec::new())),
            description: RwLock::new((None, None)),
        }
    }

    /// Everything stored so far.
    pub async fn snapshot(&self) -> Vec<Message> {
        self.messages.read().await.clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(&self, message: &Message) -> Result<(), StoreError> {
        self.messages.write().await.push(message.clone());
        Ok(())
    }

    async fn recent(&self, n: usize) -> Result<Vec<Message>, StoreError> {
        let messages = self.messages.read().await;
        let start = messages.len().saturating_sub(n);
        Ok(messages[start..].to_vec())
    }

    async fn describe(&self, name: &str, summary: &str) -> Result<(), StoreError> {
        *self.description.write().await = (Some(name.to_string()), Some(summary.to_string()));
        Ok(())
    }

    async fn conversations(&self) -> Result<Vec<ConversationSummary>, StoreError> {
        let (name, summary) = self.description.read().await.clone();
        Ok(vec![ConversationSummary {
            id: self.id.clone(),
            name,
            summary,
            message_count: self.messages.read().await.len(),
        }])
    }
}
