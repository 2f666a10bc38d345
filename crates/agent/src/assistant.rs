//! One conversational turn: reason about the task, then answer out loud.

use crate::narration::{NarrationPipeline, NarrationReport};
use crate::reasoning::{ReasoningLoop, TaskOutcome, json_object};
use crate::request::{ChunkObserver, RequestChannel, RequestError, RequestHooks};
use daisy_core::error::StoreError;
use daisy_core::message::{Conversation, ConversationId, Message};
use daisy_core::provider::ChatRequest;
use daisy_core::store::ConversationStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The answer to one user message.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub outcome: TaskOutcome,
    /// Cancelled while streaming; `text` is what had arrived
    pub partial: bool,
    pub narration: Option<NarrationReport>,
}

const DESCRIBE_PROMPT: &str = "Give this conversation a short name (at most five words) and a one-sentence summary. \
Respond only with JSON: {\"name\": \"...\", \"summary\": \"...\"}";

const DESCRIPTION_TOKENS: u32 = 120;

/// Name and summary shown in the conversation listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Description {
    pub name: String,
    pub summary: String,
}

impl Description {
    /// Parse a model reply; text around the JSON object is ignored.
    pub fn parse(reply: &str) -> Option<Self> {
        let value = json_object(reply)?;
        let field = |key: &str| -> Option<String> {
            let text = value.get(key)?.as_str()?.trim();
            (!text.is_empty()).then(|| text.to_string())
        };
        Some(Self {
            name: field("name")?,
            summary: field("summary").unwrap_or_default(),
        })
    }
}

pub struct Assistant {
    channel: Arc<RequestChannel>,
    model: String,
    temperature: f32,
    system_prompt: Option<String>,
    recent_limit: usize,
    reasoning: Option<ReasoningLoop>,
    narrator: Option<NarrationPipeline>,
    store: Option<Arc<dyn ConversationStore>>,
    conversation: Conversation,
}

impl Assistant {
    pub fn new(channel: Arc<RequestChannel>, model: impl Into<String>) -> Self {
        Self {
            channel,
            model: model.into(),
            temperature: 0.7,
            system_prompt: None,
            recent_limit: 20,
            reasoning: None,
            narrator: None,
            store: None,
            conversation: Conversation::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.system_prompt = (!prompt.trim().is_empty()).then_some(prompt);
        self
    }

    /// How many past messages each answer request carries.
    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit.max(1);
        self
    }

    pub fn with_reasoning(mut self, reasoning: ReasoningLoop) -> Self {
        self.reasoning = Some(reasoning);
        self
    }

    pub fn with_narrator(mut self, narrator: NarrationPipeline) -> Self {
        self.narrator = Some(narrator);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ConversationStore>, id: ConversationId) -> Self {
        self.store = Some(store);
        self.conversation = Conversation::with_id(id);
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn narrates(&self) -> bool {
        self.narrator.is_some()
    }

    /// Load the most recent stored messages into the conversation.
    pub async fn load_history(&mut self) -> Result<usize, StoreError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let messages = store.recent(self.recent_limit).await?;
        let loaded = messages.len();
        self.conversation.messages = messages;
        debug!(loaded, "Loaded conversation history");
        Ok(loaded)
    }

    /// Answer one user message.
    ///
    /// With tools registered the reasoning loop runs first and its outcome is
    /// passed to the answering request as a system message. The answer is
    /// narrated when a narrator is configured.
    pub async fn respond(
        &mut self,
        user_text: &str,
        cancel: &CancellationToken,
        filler: Option<&CancellationToken>,
        on_chunk: Option<&ChunkObserver<'_>>,
    ) -> Result<Reply, RequestError> {
        self.append(Message::user(user_text)).await;

        let outcome = match &self.reasoning {
            Some(reasoning) if !reasoning.tools().is_empty() => {
                reasoning.run(&mut self.conversation, cancel).await
            }
            _ => TaskOutcome::Idle,
        };
        if outcome == TaskOutcome::Cancelled {
            return Err(RequestError::Cancelled);
        }
        info!(outcome = outcome.label(), "Answering");

        let mut messages = Vec::new();
        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(prompt.clone()));
        }
        messages.extend_from_slice(self.conversation.recent(self.recent_limit));
        if let Some(rendered) = outcome.render() {
            messages.push(Message::system(rendered));
        }

        let request = ChatRequest::new(self.model.clone(), messages).with_temperature(self.temperature);
        let hooks = RequestHooks {
            narrator: self.narrator.as_ref(),
            filler,
            on_chunk,
        };
        let completion = self.channel.request_with(request, cancel, hooks).await?;

        let text = completion.text.trim().to_string();
        if !text.is_empty() {
            self.append(Message::assistant(text.clone())).await;
        }

        Ok(Reply {
            text,
            outcome,
            partial: completion.partial,
            narration: completion.narration,
        })
    }

    /// Ask the model to name and summarize the conversation, then store it.
    ///
    /// Returns `None` without a store, for an empty conversation, or when the
    /// reply holds no usable name.
    pub async fn describe_conversation(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<Description>, RequestError> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        if self.conversation.messages.is_empty() {
            return Ok(None);
        }

        let mut messages = self.conversation.recent(self.recent_limit).to_vec();
        messages.push(Message::user(DESCRIBE_PROMPT));
        let request = ChatRequest::new(self.model.clone(), messages)
            .with_temperature(0.0)
            .with_max_tokens(Some(DESCRIPTION_TOKENS));
        let completion = self.channel.request(request, cancel).await?;

        let Some(description) = Description::parse(&completion.text) else {
            warn!(reply = %completion.text, "Unusable conversation description");
            return Ok(None);
        };
        if let Err(e) = store.describe(&description.name, &description.summary).await {
            warn!(error = %e, "Failed to store conversation description");
        }
        debug!(name = %description.name, "Conversation described");
        Ok(Some(description))
    }

    async fn append(&mut self, message: Message) {
        if let Some(store) = &self.store
            && let Err(e) = store.append(&message).await
        {
            warn!(error = %e, "Failed to persist message");
        }
        self.conversation.push(message);
    }
}
