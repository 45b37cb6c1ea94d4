//! OpenAI embedding provider implementation.
//!
//! This module provides an implementation of the `EmbeddingProvider` trait
//! using OpenAI's text embedding API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{EmbeddingError, EmbeddingProvider, EmbeddingResult};

/// Default OpenAI API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI embedding provider configuration.
///
/// Holds the HTTP client and the model settings used to call the
/// `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAIEmbedding {
    client: reqwest::Client,

    /// OpenAI API key for authentication
    api_key: String,

    /// API base URL (overridable for compatible gateways)
    base_url: String,

    /// Model identifier (e.g., "text-embedding-3-small")
    model: String,

    /// Expected dimension of the embedding vectors
    embedding_dimension: usize,
}

impl OpenAIEmbedding {
    /// Create a new OpenAI embedding provider.
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API key
    /// * `model` - Model name (defaults to "text-embedding-3-small" if None)
    pub fn new(api_key: String, model: Option<String>) -> Self {
        let model = model.unwrap_or_else(|| crate::DEFAULT_EMBEDDING_MODEL.to_string());
        let embedding_dimension = Self::dimension_for_model(&model);

        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model,
            embedding_dimension,
        }
    }

    /// Point the provider at a different OpenAI-compatible base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Apply a request timeout.
    ///
    /// # Errors
    /// Returns `EmbeddingError::ConfigError` if the HTTP client cannot be built
    pub fn with_timeout(mut self, timeout: Duration) -> EmbeddingResult<Self> {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(self)
    }

    /// Known output dimension for an OpenAI embedding model.
    pub fn dimension_for_model(model: &str) -> usize {
        match model {
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            "text-embedding-ada-002" => 1536,
            _ => 1536, // default fallback
        }
    }

    async fn request(&self, input: Vec<String>) -> EmbeddingResult<Vec<Vec<f32>>> {
        let expected = input.len();
        let request = EmbeddingRequest {
            model: &self.model,
            input,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::ApiError(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("OpenAI embeddings API error: {} - {}", status, body);
            return Err(EmbeddingError::ApiError(format!("{} - {}", status, body)));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::ApiError(format!("Failed to parse response: {}", e)))?;

        if parsed.data.len() != expected {
            return Err(EmbeddingError::Other(format!(
                "Expected {} embeddings, received {}",
                expected,
                parsed.data.len()
            )));
        }

        // The API may return items out of order; `index` is authoritative.
        parsed.data.sort_by_key(|item| item.index);
        debug!("Received {} embeddings from {}", parsed.data.len(), self.model);

        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedding {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Text cannot be empty".to_string()));
        }

        self.request(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Other("No embedding generated".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        if texts.iter().any(|text| text.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput("All texts must be non-empty".to_string()));
        }

        self.request(texts.iter().map(|s| s.to_string()).collect()).await
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
