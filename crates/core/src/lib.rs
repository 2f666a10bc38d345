//! # Daisy Core
//!
//! Domain types, traits, and error definitions for the Daisy assistant runtime.
//! Nothing in here talks to the network or the filesystem; this crate
//! defines the model every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Each external collaborator (chat backend, embedder, tool, conversation
//! store, speech synthesis, audio output) is a trait here. Implementations
//! live in their own crates, so the engine can be driven end to end with
//! scripted doubles in tests.

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod speech;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{ProviderError, SpeechError, StoreError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, Role, TRUNCATION_MARKER};
pub use provider::{ChatProvider, ChatRequest, EmbeddingProvider, StreamChunk};
pub use speech::{AudioClip, AudioPlayer, TtsProvider};
pub use store::{ConversationStore, ConversationSummary};
pub use tool::{Tool, ToolDescriptor, ToolRegistry};
