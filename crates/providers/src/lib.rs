//! Backend implementations for Daisy.
//!
//! Chat and embeddings implement the `daisy_core` provider traits against
//! OpenAI-compatible endpoints; speech goes through `/audio/speech` and is
//! played by an external command. [`build_from_config`] wires them up.

pub mod builder;
pub mod openai_compat;
pub mod player;
pub mod tts;

pub use builder::{Backends, build_from_config};
pub use openai_compat::OpenAiCompatProvider;
pub use player::CommandPlayer;
pub use tts::OpenAiTts;
