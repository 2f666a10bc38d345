//! Error types for the Daisy domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether another attempt with the same request could succeed.
    ///
    /// Malformed requests, bad credentials and unknown models fail the
    /// same way every time, so they are never retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ApiError { .. }
            | Self::RateLimited { .. }
            | Self::StreamInterrupted(_)
            | Self::Timeout(_)
            | Self::Network(_) => true,
            Self::AuthenticationFailed(_)
            | Self::ModelNotFound(_)
            | Self::InvalidRequest(_)
            | Self::NotConfigured(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool cancelled: {0}")]
    Cancelled(String),
}

#[derive(Debug, Clone, Error)]
pub enum SpeechError {
    /// Network hiccups and 5xx responses; worth one more try.
    #[error("Transient synthesis failure: {0}")]
    Transient(String),

    #[error("Synthesis failed: {0}")]
    Permanent(String),

    #[error("Playback failed: {0}")]
    Playback(String),

    #[error("Speech cancelled")]
    Cancelled,
}

impl SpeechError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
