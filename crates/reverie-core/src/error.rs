//! Error types for the experience engine and the generative backend

use reverie_voice::VoiceError;
use thiserror::Error;

/// Failures talking to the generative AI service. None of these reach the
/// visitor: the engine logs them and substitutes fallback content.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("API key not configured (set GEMINI_API_KEY or API_KEY)")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Backend returned no usable content")]
    EmptyResponse,

    #[error("Malformed backend response: {0}")]
    Malformed(String),

    #[error("Backend call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Malformed(err.to_string())
    }
}

/// Errors that escape the narrative: building an experience or talking to one
/// that has already shut down.
#[derive(Error, Debug)]
pub enum ExperienceError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Voice error: {0}")]
    Voice(#[from] VoiceError),

    #[error("Experience has shut down")]
    Closed,
}

pub type ExperienceResult<T> = Result<T, ExperienceError>;
