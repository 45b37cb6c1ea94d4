//! Language-model completion abstraction.
//!
//! The retrieval chain hands a system instruction and a user message to a
//! `CompletionProvider` and gets back the model's text. Implementations:
//! - OpenAI-compatible chat completions (HTTP API)
//! - Mocks in tests

pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while asking a model for a completion.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Network failure or non-success HTTP status
    #[error("API request failed: {0}")]
    ApiError(String),

    /// The API answered but produced no text
    #[error("Model returned an empty response")]
    EmptyResponse,

    /// Missing API key, bad timeout, etc.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type CompletionResult<T> = Result<T, CompletionError>;

/// Trait for language-model backends.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Ask the model to respond to `user` under the `system` instruction.
    async fn complete(&self, system: &str, user: &str) -> CompletionResult<String>;

    /// Model identifier for logging.
    fn model_name(&self) -> &str;
}
