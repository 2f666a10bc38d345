//! OpenAI-style `/audio/speech` synthesis.

use async_trait::async_trait;
use daisy_core::error::SpeechError;
use daisy_core::speech::{AudioClip, TtsProvider};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Synthesizes one sentence at a time through an OpenAI-compatible endpoint.
pub struct OpenAiTts {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
    speed: f32,
}

impl OpenAiTts {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
        speed: f32,
    ) -> std::result::Result<Self, SpeechError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(SpeechError::Permanent("API key required for TTS".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SpeechError::Permanent(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            voice: voice.into(),
            speed,
        })
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    response_format: &'a str,
}

/// 429 and server-side failures may clear up on their own.
fn classify(status: u16, body: String) -> SpeechError {
    if status == 429 || status >= 500 {
        SpeechError::Transient(format!("TTS error {status}: {body}"))
    } else {
        SpeechError::Permanent(format!("TTS error {status}: {body}"))
    }
}

#[async_trait]
impl TtsProvider for OpenAiTts {
    async fn synthesize(&self, text: &str) -> std::result::Result<AudioClip, SpeechError> {
        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
            response_format: "mp3",
        };

        debug!(chars = text.len(), voice = %self.voice, "Synthesizing sentence");

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| SpeechError::Transient(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, body));
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| SpeechError::Transient(e.to_string()))?;

        Ok(AudioClip {
            text: text.to_string(),
            data: data.to_vec(),
        })
    }
}
