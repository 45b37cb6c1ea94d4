//! FastEmbed embedding provider implementation.
//!
//! Runs an embedding model locally through the fastembed library, so catalog
//! chunks can be indexed and queried without an API key.

use super::{EmbeddingError, EmbeddingProvider, EmbeddingResult};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Models this provider knows the dimension of, keyed by their stored name.
const KNOWN_MODELS: [(EmbeddingModel, usize); 8] = [
    (EmbeddingModel::AllMiniLML6V2, 384),
    (EmbeddingModel::BGESmallENV15, 384),
    (EmbeddingModel::BGEBaseENV15, 768),
    (EmbeddingModel::BGELargeENV15, 1024),
    (EmbeddingModel::NomicEmbedTextV1, 768),
    (EmbeddingModel::NomicEmbedTextV15, 768),
    (EmbeddingModel::ParaphraseMLMiniLML12V2, 384),
    (EmbeddingModel::ParaphraseMLMpnetBaseV2, 768),
];

/// Resolve a stored model name (the `Debug` form, e.g. "AllMiniLML6V2") to a model.
///
/// # Errors
/// Returns `EmbeddingError::ConfigError` for names outside the known model list
pub fn parse_model_name(name: &str) -> EmbeddingResult<EmbeddingModel> {
    KNOWN_MODELS
        .iter()
        .map(|(model, _)| model.clone())
        .find(|model| format!("{:?}", model).eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| EmbeddingError::ConfigError(format!("Unknown FastEmbed model: {}", name)))
}

fn dimension_for(model: &EmbeddingModel) -> usize {
    KNOWN_MODELS
        .iter()
        .find(|(known, _)| known == model)
        .map(|(_, dimension)| *dimension)
        .unwrap_or(384)
}

/// FastEmbed embedding provider.
///
/// The model instance sits behind an async mutex because fastembed sessions
/// are not safe to drive concurrently.
#[derive(Clone)]
pub struct FastEmbedProvider {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    embedding_dimension: usize,
}

impl FastEmbedProvider {
    /// Create a new FastEmbed embedding provider.
    ///
    /// # Arguments
    /// * `model` - Optional model to use (defaults to AllMiniLML6V2)
    /// * `cache_dir` - Optional cache directory for model files
    ///
    /// # Errors
    /// Returns `EmbeddingError` if model initialization fails
    pub fn new(
        model: Option<EmbeddingModel>,
        cache_dir: Option<String>,
    ) -> EmbeddingResult<Self> {
        let model_type = model.unwrap_or(EmbeddingModel::AllMiniLML6V2);
        let model_name = format!("{:?}", model_type);
        let embedding_dimension = dimension_for(&model_type);

        let mut init_options = InitOptions::new(model_type);
        if let Some(dir) = cache_dir {
            init_options = init_options.with_cache_dir(PathBuf::from(dir));
        }

        let text_embedding = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::ConfigError(format!("Failed to initialize FastEmbed model: {}", e)))?;

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            model_name,
            embedding_dimension,
        })
    }

    /// Create a provider with the default model and cache directory.
    ///
    /// # Errors
    /// Returns `EmbeddingError` if model initialization fails
    pub fn with_defaults() -> EmbeddingResult<Self> {
        Self::new(None, None)
    }
}

impl FastEmbedProvider {
    async fn run(&self, texts: Vec<String>) -> EmbeddingResult<Vec<Vec<f32>>> {
        // fastembed 4 takes &self here, newer releases take &mut self
        #[allow(unused_mut)]
        let mut model = self.model.lock().await;
        model
            .embed(texts, None)
            .map_err(|e| EmbeddingError::Other(format!("Embedding generation failed: {}", e)))
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Text cannot be empty".to_string()));
        }

        self.run(vec![text.to_string()])
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

        self.run(texts.iter().map(|s| s.to_string()).collect()).await
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

// TextEmbedding has no Debug impl
impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model_name", &self.model_name)
            .field("embedding_dimension", &self.embedding_dimension)
            .finish()
    }
}
