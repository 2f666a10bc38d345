//! Configuration loading, validation, and management for Daisy.
//!
//! Loads configuration from `~/.daisy/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.daisy/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the chat and embedding endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model used for user-facing answers
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Model used by the reasoning loop (falls back to `default_model`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_model: Option<String>,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Prepended to every user-facing request
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Streaming request behaviour
    #[serde(default)]
    pub request: RequestConfig,

    /// Reasoning loop bounds
    #[serde(default)]
    pub reasoning: ReasoningConfig,

    /// Spoken narration of answers
    #[serde(default)]
    pub narration: NarrationConfig,

    /// Text-to-speech endpoint and player
    #[serde(default)]
    pub tts: TtsConfig,

    /// Command-matching embeddings
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    /// Conversation persistence
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_system_prompt() -> String {
    "You are Daisy, a helpful voice assistant. Keep answers short and conversational; \
     they will be read aloud."
        .into()
}
fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("reasoning_model", &self.reasoning_model)
            .field("default_temperature", &self.default_temperature)
            .field("request", &self.request)
            .field("reasoning", &self.reasoning)
            .field("narration", &self.narration)
            .field("tts", &self.tts)
            .field("embeddings", &self.embeddings)
            .field("store", &self.store)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Read timeout for the initial response and for each streamed chunk
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_timeout_secs() -> u64 {
    5
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    250
}

impl RequestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Most recent conversation messages each reasoning prompt carries
    #[serde(default = "default_context_messages")]
    pub context_messages: usize,

    /// Token cap for the yes/no "is the task done" check
    #[serde(default = "default_completion_check_tokens")]
    pub completion_check_tokens: u32,

    /// Token cap for the one-sentence completion summary
    #[serde(default = "default_summary_tokens")]
    pub summary_tokens: u32,

    /// User messages longer than this many characters get truncated
    #[serde(default = "default_truncate_over")]
    pub truncate_over: usize,

    /// Characters kept when truncating
    #[serde(default = "default_truncate_keep")]
    pub truncate_keep: usize,

    /// Minimum confidence (0–100) for a command suggestion
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,

    /// Temperature for reasoning prompts
    #[serde(default)]
    pub temperature: f32,
}

fn default_max_iterations() -> usize {
    8
}
fn default_context_messages() -> usize {
    20
}
fn default_completion_check_tokens() -> u32 {
    10
}
fn default_summary_tokens() -> u32 {
    200
}
fn default_truncate_over() -> usize {
    1000
}
fn default_truncate_keep() -> usize {
    975
}
fn default_match_threshold() -> f32 {
    50.0
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            context_messages: default_context_messages(),
            completion_check_tokens: default_completion_check_tokens(),
            summary_tokens: default_summary_tokens(),
            truncate_over: default_truncate_over(),
            truncate_keep: default_truncate_keep(),
            match_threshold: default_match_threshold(),
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Upper bound on how long the synthesizer waits between snapshot checks
    #[serde(default = "default_synth_interval_ms")]
    pub synth_interval_ms: u64,

    /// Upper bound on how long the player waits between queue checks
    #[serde(default = "default_player_interval_ms")]
    pub player_interval_ms: u64,

    /// Extra attempts for a sentence after a transient synthesis failure
    #[serde(default = "default_tts_retries")]
    pub tts_retries: u32,
}

fn default_synth_interval_ms() -> u64 {
    500
}
fn default_player_interval_ms() -> u64 {
    10
}
fn default_tts_retries() -> u32 {
    1
}

impl NarrationConfig {
    pub fn synth_interval(&self) -> Duration {
        Duration::from_millis(self.synth_interval_ms)
    }

    pub fn player_interval(&self) -> Duration {
        Duration::from_millis(self.player_interval_ms)
    }
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            synth_interval_ms: default_synth_interval_ms(),
            player_interval_ms: default_player_interval_ms(),
            tts_retries: default_tts_retries(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    /// Falls back to the top-level `api_url` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Falls back to the top-level `api_key` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_tts_model")]
    pub model: String,

    #[serde(default = "default_voice")]
    pub voice: String,

    #[serde(default = "default_speed")]
    pub speed: f32,

    /// Program that reads encoded audio on stdin and plays it
    #[serde(default = "default_player_command")]
    pub player_command: Vec<String>,
}

fn default_tts_model() -> String {
    "tts-1".into()
}
fn default_voice() -> String {
    "nova".into()
}
fn default_speed() -> f32 {
    1.0
}
fn default_player_command() -> Vec<String> {
    vec![
        "mpv".into(),
        "--no-terminal".into(),
        "--no-video".into(),
        "-".into(),
    ]
}

impl std::fmt::Debug for TtsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtsConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("speed", &self.speed)
            .field("player_command", &self.player_command)
            .finish()
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            model: default_tts_model(),
            voice: default_voice(),
            speed: default_speed(),
            player_command: default_player_command(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Directory holding `module-<tool>.json` example files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules_dir: Option<PathBuf>,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            modules_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file (defaults to `~/.daisy/daisy.db`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_conversation_id")]
    pub conversation_id: String,

    /// How many stored messages make up a request's context
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

fn default_max_connections() -> u32 {
    4
}
fn default_conversation_id() -> String {
    "default".into()
}
fn default_recent_limit() -> usize {
    20
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: default_max_connections(),
            conversation_id: default_conversation_id(),
            recent_limit: default_recent_limit(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location with environment
    /// variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        // Environment variable overrides (highest priority)
        if config.api_key.is_none() {
            config.api_key = std::env::var("DAISY_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("DAISY_MODEL") {
            config.default_model = model;
        }

        if let Ok(url) = std::env::var("DAISY_API_URL") {
            config.api_url = url;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".daisy")
    }

    /// Where module example files live unless configured otherwise.
    pub fn modules_dir(&self) -> PathBuf {
        self.embeddings
            .modules_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("modules"))
    }

    /// Where the conversation database lives unless configured otherwise.
    pub fn store_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("daisy.db"))
    }

    pub fn reasoning_model(&self) -> &str {
        self.reasoning_model.as_deref().unwrap_or(&self.default_model)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.request.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "request.max_attempts must be at least 1".into(),
            ));
        }

        if self.reasoning.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "reasoning.max_iterations must be at least 1".into(),
            ));
        }

        if self.reasoning.context_messages == 0 {
            return Err(ConfigError::ValidationError(
                "reasoning.context_messages must be at least 1".into(),
            ));
        }

        if self.reasoning.truncate_keep >= self.reasoning.truncate_over {
            return Err(ConfigError::ValidationError(
                "reasoning.truncate_keep must be smaller than reasoning.truncate_over".into(),
            ));
        }

        if !(0.0..=100.0).contains(&self.reasoning.match_threshold) {
            return Err(ConfigError::ValidationError(
                "reasoning.match_threshold must be between 0 and 100".into(),
            ));
        }

        if self.store.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "store.max_connections must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            default_model: default_model(),
            reasoning_model: None,
            default_temperature: default_temperature(),
            system_prompt: default_system_prompt(),
            request: RequestConfig::default(),
            reasoning: ReasoningConfig::default(),
            narration: NarrationConfig::default(),
            tts: TtsConfig::default(),
            embeddings: EmbeddingsConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
