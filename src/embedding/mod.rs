//! Embedding provider abstraction and implementations.
//!
//! This module defines the interface for text embedding generation and provides
//! a local model (fastembed) and a remote one (OpenAI).
//!
//! The abstraction allows the system to swap between different embedding models
//! without changing the core logic of ingestion or retrieval.

pub mod fastembed;
pub mod openai;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use self::fastembed::FastEmbedProvider;
use self::openai::OpenAIEmbedding;
use crate::models::EmbeddingConfig;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Network or API communication error
    #[error("API request failed: {0}")]
    ApiError(String),

    /// Invalid input text (e.g., empty, too long)
    #[error("Invalid input text: {0}")]
    InvalidInput(String),

    /// Configuration error (e.g., missing API key)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Other unexpected errors
    #[error("Unexpected error: {0}")]
    Other(String),
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Trait for text embedding providers.
///
/// Implementors of this trait can generate vector embeddings from text inputs.
/// The trait is async to support API-based embedding services.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text.
    ///
    /// # Errors
    /// Returns `EmbeddingError` if the embedding generation fails
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Generate embeddings for multiple texts in a single batch.
    ///
    /// Returns embeddings in the same order as the input texts.
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Number of dimensions in the produced vectors.
    fn dimension(&self) -> usize;

    /// Model identifier (e.g. "text-embedding-3-small").
    fn model_name(&self) -> &str;
}

/// Normalizes text for consistent embedding generation.
///
/// Lowercases, trims, and collapses runs of whitespace to a single space.
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Which embedding backend to use when building a new index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Local fastembed model, no API required
    FastEmbed,
    /// OpenAI embeddings API (requires OPENAI_API_KEY)
    OpenAI,
}

impl fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingProviderKind::FastEmbed => f.write_str("fastembed"),
            EmbeddingProviderKind::OpenAI => f.write_str("openai"),
        }
    }
}

impl FromStr for EmbeddingProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fastembed" | "fast-embed" => Ok(EmbeddingProviderKind::FastEmbed),
            "openai" => Ok(EmbeddingProviderKind::OpenAI),
            other => Err(format!("unknown embedding provider '{}'", other)),
        }
    }
}

/// Wrapper enum for embedding providers to allow choosing one at runtime.
pub enum DynamicEmbeddingProvider {
    FastEmbed(FastEmbedProvider),
    OpenAI(OpenAIEmbedding),
}

impl DynamicEmbeddingProvider {
    /// Build the provider that produced an existing index.
    ///
    /// Models whose name contains "text-embedding" are OpenAI models; anything
    /// else is assumed to be a fastembed model.
    ///
    /// # Errors
    /// Returns `EmbeddingError::ConfigError` if the API key is missing or the
    /// provider's dimension does not match the stored configuration
    pub fn for_stored_config(
        config: &EmbeddingConfig,
        api_key: Option<String>,
        base_url: &str,
        cache_dir: Option<String>,
    ) -> EmbeddingResult<Self> {
        info!("Auto-detecting embedding provider for model: {}", config.model_name);

        let provider = if config.model_name.contains("text-embedding") {
            let api_key = api_key.ok_or_else(|| {
                EmbeddingError::ConfigError(
                    "OPENAI_API_KEY environment variable required for OpenAI embeddings".to_string(),
                )
            })?;
            DynamicEmbeddingProvider::OpenAI(
                OpenAIEmbedding::new(api_key, Some(config.model_name.clone())).with_base_url(base_url),
            )
        } else {
            let model = fastembed::parse_model_name(&config.model_name)?;
            DynamicEmbeddingProvider::FastEmbed(FastEmbedProvider::new(Some(model), cache_dir)?)
        };

        if provider.dimension() != config.dimension {
            return Err(EmbeddingError::ConfigError(format!(
                "Dimension mismatch: expected {} from stored config, but provider returns {}",
                config.dimension,
                provider.dimension()
            )));
        }

        Ok(provider)
    }

    /// Build a provider of the requested kind for a new index.
    ///
    /// # Errors
    /// Returns `EmbeddingError::ConfigError` if the API key is missing or the
    /// model cannot be initialized
    pub fn for_kind(
        kind: EmbeddingProviderKind,
        model: Option<String>,
        api_key: Option<String>,
        base_url: &str,
        cache_dir: Option<String>,
    ) -> EmbeddingResult<Self> {
        match kind {
            EmbeddingProviderKind::FastEmbed => {
                let model = model
                    .as_deref()
                    .map(fastembed::parse_model_name)
                    .transpose()?;
                Ok(DynamicEmbeddingProvider::FastEmbed(FastEmbedProvider::new(model, cache_dir)?))
            }
            EmbeddingProviderKind::OpenAI => {
                let api_key = api_key.ok_or_else(|| {
                    EmbeddingError::ConfigError(
                        "OPENAI_API_KEY environment variable must be set when using OpenAI provider"
                            .to_string(),
                    )
                })?;
                Ok(DynamicEmbeddingProvider::OpenAI(
                    OpenAIEmbedding::new(api_key, model).with_base_url(base_url),
                ))
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for DynamicEmbeddingProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.embed(text).await,
            DynamicEmbeddingProvider::OpenAI(p) => p.embed(text).await,
        }
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.embed_batch(texts).await,
            DynamicEmbeddingProvider::OpenAI(p) => p.embed_batch(texts).await,
        }
    }

    fn dimension(&self) -> usize {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.dimension(),
            DynamicEmbeddingProvider::OpenAI(p) => p.dimension(),
        }
    }

    fn model_name(&self) -> &str {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.model_name(),
            DynamicEmbeddingProvider::OpenAI(p) => p.model_name(),
        }
    }
}
