//! Builds the configured backends.

use std::sync::Arc;

use daisy_config::AppConfig;
use daisy_core::error::ProviderError;
use daisy_core::provider::{ChatProvider, EmbeddingProvider};
use daisy_core::speech::{AudioPlayer, TtsProvider};
use tracing::{info, warn};

use crate::openai_compat::OpenAiCompatProvider;
use crate::player::CommandPlayer;
use crate::tts::OpenAiTts;

/// Everything the engine talks to outside the process.
pub struct Backends {
    pub chat: Arc<dyn ChatProvider>,
    pub embeddings: Arc<dyn EmbeddingProvider>,
    /// `None` when narration is disabled or cannot be set up
    pub tts: Option<Arc<dyn TtsProvider>>,
    pub player: Option<Arc<dyn AudioPlayer>>,
}

/// Build providers from configuration.
///
/// Chat and embeddings share one OpenAI-compatible client. Speech is
/// optional: a missing key or an empty player command only disables
/// narration.
pub fn build_from_config(config: &AppConfig) -> std::result::Result<Backends, ProviderError> {
    let api_key = config
        .api_key
        .clone()
        .ok_or_else(|| ProviderError::NotConfigured("no API key configured".into()))?;

    let provider = Arc::new(
        OpenAiCompatProvider::new("openai", &config.api_url, &api_key)?
            .with_embedding_model(&config.embeddings.model),
    );

    let (tts, player) = if config.narration.enabled {
        build_speech(config, &api_key)
    } else {
        (None, None)
    };

    info!(
        api_url = %config.api_url,
        model = %config.default_model,
        narration = tts.is_some(),
        "Backends ready"
    );

    Ok(Backends {
        chat: provider.clone(),
        embeddings: provider,
        tts,
        player,
    })
}

fn build_speech(
    config: &AppConfig,
    fallback_key: &str,
) -> (Option<Arc<dyn TtsProvider>>, Option<Arc<dyn AudioPlayer>>) {
    let tts_cfg = &config.tts;
    let url = tts_cfg.api_url.as_deref().unwrap_or(&config.api_url);
    let key = tts_cfg.api_key.as_deref().unwrap_or(fallback_key);

    let tts = match OpenAiTts::new(url, key, &tts_cfg.model, &tts_cfg.voice, tts_cfg.speed) {
        Ok(tts) => tts,
        Err(e) => {
            warn!(error = %e, "Narration disabled");
            return (None, None);
        }
    };

    let Some(player) = CommandPlayer::from_command(&tts_cfg.player_command) else {
        warn!("Narration disabled: tts.player_command is empty");
        return (None, None);
    };

    (Some(Arc::new(tts)), Some(Arc::new(player)))
}
