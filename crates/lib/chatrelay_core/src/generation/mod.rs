//! Completion engine interface.
//!
//! The engine is stateless per call: it receives the whole transcript every
//! time and returns at most one completion text.
//!
//! # Providers
//!
//! - [`openai::OpenAiEngine`] — OpenAI-compatible `/chat/completions`

pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

use crate::transcript::Transcript;

pub use openai::OpenAiEngine;

/// Errors raised while calling the completion API.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The API answered with a non-success status. `body` is the upstream
    /// payload, parsed as JSON when possible and as a string otherwise.
    #[error("Completion API returned {status}: {body}")]
    Api {
        status: u16,
        body: serde_json::Value,
    },

    #[error("Completion request failed: {0}")]
    Transport(String),

    #[error("Completion response parse error: {0}")]
    Decode(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl GenerationError {
    /// Diagnostic payload for callers: the upstream body for API errors, the
    /// message string otherwise.
    pub fn details(&self) -> serde_json::Value {
        match self {
            GenerationError::Api { body, .. } => body.clone(),
            other => serde_json::Value::String(other.to_string()),
        }
    }
}

/// Fixed sampling parameters sent with every completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            max_tokens: 200,
            temperature: 1.0,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

/// One call to the engine.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub transcript: &'a Transcript,
    /// Optional reusable-prompt reference, passed through untouched.
    pub prompt_id: Option<&'a str>,
}

/// Completion engine.
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Generate a reply for `request`. `Ok(None)` means the engine answered
    /// successfully but produced no usable text.
    async fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> Result<Option<String>, GenerationError>;
}
