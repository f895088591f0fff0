//! Generative AI backend seam.
//!
//! The engine only sees `GenerativeBackend`; every error it returns is absorbed
//! into fallback content, so implementations are free to fail.

pub mod gemini;

pub use gemini::GeminiClient;

use crate::appearance::UserAppearance;
use crate::error::BackendError;
use async_trait::async_trait;
use reverie_voice::{AudioPayload, ImagePayload};

#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Derive avatar colours from a camera snapshot.
    async fn analyze_appearance(&self, image: &ImagePayload)
        -> Result<UserAppearance, BackendError>;

    /// Answer the visitor's recorded reply. `context` is the chosen archetype's title.
    /// An empty answer is reported as `BackendError::EmptyResponse`.
    async fn generate_reply(
        &self,
        audio: &AudioPayload,
        context: &str,
    ) -> Result<String, BackendError>;
}

/// Backend used when no API key is configured: every call fails, so the
/// narrative runs entirely on fallback content.
#[derive(Debug, Default)]
pub struct PlaceholderBackend;

#[async_trait]
impl GenerativeBackend for PlaceholderBackend {
    async fn analyze_appearance(
        &self,
        _image: &ImagePayload,
    ) -> Result<UserAppearance, BackendError> {
        Err(BackendError::MissingApiKey)
    }

    async fn generate_reply(
        &self,
        _audio: &AudioPayload,
        _context: &str,
    ) -> Result<String, BackendError> {
        Err(BackendError::MissingApiKey)
    }
}
