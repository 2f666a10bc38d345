//! Speech output: text-to-speech synthesis and audio playback.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::SpeechError;

/// A synthesized, ready-to-play piece of audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    /// The sentence this clip speaks
    pub text: String,

    /// Encoded audio (format is whatever the synthesizer emits)
    pub data: Vec<u8>,
}

/// Text → audio.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    /// Synthesize one sentence. Transient network failures are reported as
    /// [`SpeechError::Transient`] so the caller may retry.
    async fn synthesize(&self, text: &str) -> std::result::Result<AudioClip, SpeechError>;
}

/// Plays clips one at a time.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Play a clip to the end, or stop early when `cancel` fires.
    async fn play(
        &self,
        clip: &AudioClip,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), SpeechError>;
}
