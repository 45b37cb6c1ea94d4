//! Ingestion pipeline module.
//!
//! Splits catalog text into overlapping chunks, skips chunks that are already
//! indexed, embeds the rest in batches and persists them.
//!
//! # Usage Patterns
//!
//! ## Primary: Adding to an Existing Index
//! Connect to a database that already holds chunks and an embedding
//! configuration:
//!
//! ```ignore
//! use book_boss::ingestion::{IngestionPipeline, TextSplitter};
//! use book_boss::storage::sqlite::SqliteStorage;
//! use book_boss::embedding::fastembed::FastEmbedProvider;
//! use book_boss::provider::text::TextFileCatalogProvider;
//!
//! let storage = SqliteStorage::open("book_index.db")?;
//! let embedding_provider = FastEmbedProvider::with_defaults()?;
//! let mut pipeline =
//!     IngestionPipeline::connect(embedding_provider, storage, TextSplitter::default(), None).await?;
//!
//! let provider = TextFileCatalogProvider::new("data/book_entries.txt")?;
//! let stats = pipeline.ingest_from_provider(&provider).await?;
//! println!("Inserted: {}, Duplicates: {}", stats.inserted, stats.duplicates_skipped);
//! ```
//!
//! ## Secondary: Creating a New Index
//! `initialize_new` creates the schema and records the provider's model and
//! dimension so later runs (and the retriever) can validate against them.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, warn};

use crate::embedding::{normalize_text, EmbeddingProvider};
use crate::models::{Chunk, EmbeddingConfig};
use crate::provider::{CatalogProvider, ProviderError};
use crate::storage::ChunkStorage;

/// Default chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default number of characters shared by neighbouring chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    /// Storage operation failed
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Provider operation failed
    #[error("Provider error: {0}")]
    ProviderError(#[from] ProviderError),

    /// Invalid input data or configuration
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Recursive character splitter.
///
/// Tries each separator in turn (paragraph, line, word, character) and merges
/// the resulting pieces back into chunks of at most `chunk_size` characters,
/// carrying up to `chunk_overlap` characters from the end of one chunk into
/// the next.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TextSplitter {
    /// # Errors
    /// Returns `IngestionError::InvalidInput` if `chunk_size` is zero or the
    /// overlap is not smaller than the chunk size
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> IngestionResult<Self> {
        if chunk_size == 0 {
            return Err(IngestionError::InvalidInput("chunk_size must be at least 1".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(IngestionError::InvalidInput(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            ..Self::default()
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into trimmed, non-empty chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let separators: Vec<&str> = self.separators.iter().map(String::as_str).collect();
        self.split_recursive(text, &separators)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // First separator present in the text wins; "" always matches.
        let mut separator = separators.last().copied().unwrap_or("");
        let mut remaining: &[&str] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = *candidate;
                break;
            }
            if text.contains(*candidate) {
                separator = *candidate;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|piece| !piece.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut small: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                small.push(piece);
                continue;
            }

            if !small.is_empty() {
                chunks.extend(self.merge_pieces(&small, separator));
                small.clear();
            }
            if remaining.is_empty() {
                let piece = piece.trim();
                if !piece.is_empty() {
                    chunks.push(piece.to_string());
                }
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }
        if !small.is_empty() {
            chunks.extend(self.merge_pieces(&small, separator));
        }

        chunks
    }

    fn merge_pieces(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let joiner = if current.is_empty() { 0 } else { separator_len };

            if total + len + joiner > self.chunk_size && !current.is_empty() {
                push_trimmed(&mut chunks, &current.join(separator));

                // Drop from the front until what is left fits as overlap.
                while total > self.chunk_overlap
                    || (total > 0 && total + len + separator_len > self.chunk_size)
                {
                    let removed = current.remove(0);
                    let joiner = if current.is_empty() { 0 } else { separator_len };
                    total -= char_len(removed) + joiner;
                }
            }

            current.push(piece);
            total += len;
            if current.len() > 1 {
                total += separator_len;
            }
        }

        push_trimmed(&mut chunks, &current.join(separator));
        chunks
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn push_trimmed(chunks: &mut Vec<String>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        chunks.push(text.to_string());
    }
}

/// Statistics from an ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestionStats {
    /// Total number of chunks processed
    pub total_processed: usize,

    /// Chunks newly written to storage
    pub inserted: usize,

    /// Chunks skipped because their normalized text was already indexed
    pub duplicates_skipped: usize,

    /// Chunks that could not be stored
    pub failed: usize,
}

impl IngestionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_inserted(&mut self) {
        self.total_processed += 1;
        self.inserted += 1;
    }

    pub fn record_duplicate(&mut self) {
        self.total_processed += 1;
        self.duplicates_skipped += 1;
    }

    pub fn record_failed(&mut self) {
        self.total_processed += 1;
        self.failed += 1;
    }

    /// Fold another run's counts into this one.
    pub fn merge(&mut self, other: &IngestionStats) {
        self.total_processed += other.total_processed;
        self.inserted += other.inserted;
        self.duplicates_skipped += other.duplicates_skipped;
        self.failed += other.failed;
    }
}

/// Ingestion pipeline coordinator.
///
/// Use [`IngestionPipeline::connect`] to extend an existing index and
/// [`IngestionPipeline::initialize_new`] to start a fresh one.
pub struct IngestionPipeline<E, S>
where
    E: EmbeddingProvider,
    S: ChunkStorage,
{
    embedding_provider: E,
    storage: S,
    splitter: TextSplitter,

    /// Number of chunks embedded per request
    batch_size: usize,
}

impl<E, S> IngestionPipeline<E, S>
where
    E: EmbeddingProvider,
    S: ChunkStorage,
{
    fn extract_config(provider: &E) -> EmbeddingConfig {
        EmbeddingConfig {
            model_name: provider.model_name().to_string(),
            dimension: provider.dimension(),
        }
    }

    /// Connect to an existing index and prepare for ingestion.
    ///
    /// # Errors
    /// Returns `IngestionError::InvalidInput` if the storage has no embedding
    /// configuration or the provider's model or dimension differ from it
    pub async fn connect(
        embedding_provider: E,
        storage: S,
        splitter: TextSplitter,
        batch_size: Option<usize>,
    ) -> IngestionResult<Self> {
        let stored_config = storage
            .get_config()
            .await
            .map_err(|e| IngestionError::StorageError(e.to_string()))?
            .ok_or_else(|| {
                IngestionError::InvalidInput(
                    "Storage has no embedding configuration. Use initialize_new() for new storage."
                        .to_string(),
                )
            })?;

        let provider_config = Self::extract_config(&embedding_provider);

        if provider_config.model_name != stored_config.model_name {
            return Err(IngestionError::InvalidInput(format!(
                "Embedding model mismatch: provider uses '{}' but storage has '{}'",
                provider_config.model_name, stored_config.model_name
            )));
        }

        if provider_config.dimension != stored_config.dimension {
            return Err(IngestionError::InvalidInput(format!(
                "Embedding dimension mismatch: provider has {} but storage has {}",
                provider_config.dimension, stored_config.dimension
            )));
        }

        Ok(Self::build(embedding_provider, storage, splitter, batch_size))
    }

    /// Initialize new storage with the given embedding provider.
    ///
    /// Creates the schema and stores the provider's embedding configuration.
    pub async fn initialize_new(
        embedding_provider: E,
        mut storage: S,
        splitter: TextSplitter,
        batch_size: Option<usize>,
    ) -> IngestionResult<Self> {
        storage
            .initialize()
            .await
            .map_err(|e| IngestionError::StorageError(e.to_string()))?;

        let config = Self::extract_config(&embedding_provider);
        storage
            .store_config(&config)
            .await
            .map_err(|e| IngestionError::StorageError(e.to_string()))?;

        Ok(Self::build(embedding_provider, storage, splitter, batch_size))
    }

    fn build(embedding_provider: E, storage: S, splitter: TextSplitter, batch_size: Option<usize>) -> Self {
        Self {
            embedding_provider,
            storage,
            splitter,
            batch_size: batch_size.unwrap_or(32).max(1),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Consume the pipeline and hand back its storage.
    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Normalized form of chunk text used for deduplication.
    pub fn normalize_content(content: &str) -> String {
        normalize_text(content)
    }

    /// Split, deduplicate, embed and store one document.
    ///
    /// # Errors
    /// Returns `IngestionError` if duplicate checks or embedding fail; a chunk
    /// that fails to insert is counted in `failed` instead
    pub async fn ingest_text(&mut self, source: &str, text: &str) -> IngestionResult<IngestionStats> {
        let mut stats = IngestionStats::new();

        let chunks: Vec<Chunk> = self
            .splitter
            .split_text(text)
            .into_iter()
            .enumerate()
            .map(|(position, content)| Chunk::new(content, source, position))
            .collect();
        debug!("Split '{}' into {} chunks", source, chunks.len());

        let mut seen: HashSet<String> = HashSet::new();
        for batch in chunks.chunks(self.batch_size) {
            let mut to_process: Vec<(&Chunk, String)> = Vec::new();

            for chunk in batch {
                let normalized = Self::normalize_content(&chunk.content);

                let exists = self
                    .storage
                    .exists_by_content(&normalized)
                    .await
                    .map_err(|e| IngestionError::StorageError(e.to_string()))?;

                if exists || !seen.insert(normalized.clone()) {
                    stats.record_duplicate();
                } else {
                    to_process.push((chunk, normalized));
                }
            }

            if to_process.is_empty() {
                continue;
            }

            let texts: Vec<&str> = to_process.iter().map(|(_, normalized)| normalized.as_str()).collect();
            let embeddings = self
                .embedding_provider
                .embed_batch(&texts)
                .await
                .map_err(|e| IngestionError::EmbeddingError(e.to_string()))?;

            if embeddings.len() != to_process.len() {
                return Err(IngestionError::EmbeddingError(format!(
                    "expected {} embeddings, got {}",
                    to_process.len(),
                    embeddings.len()
                )));
            }

            for ((chunk, _), embedding) in to_process.into_iter().zip(embeddings) {
                let mut chunk_with_embedding = chunk.clone();
                chunk_with_embedding.embedding = Some(embedding);

                match self.storage.insert_chunk(&chunk_with_embedding).await {
                    Ok(_) => stats.record_inserted(),
                    Err(e) => {
                        warn!("Failed to insert chunk {} of '{}': {}", chunk.position, source, e);
                        stats.record_failed();
                    }
                }
            }
        }

        Ok(stats)
    }

    /// Fetch the catalog text from a provider and ingest it.
    pub async fn ingest_from_provider<P>(&mut self, provider: &P) -> IngestionResult<IngestionStats>
    where
        P: CatalogProvider,
    {
        let text = provider.fetch_text().await?;
        self.ingest_text(provider.name(), &text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingError, EmbeddingResult};
    use crate::provider::ProviderResult;
    use crate::storage::{StorageError, StorageResult};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    // ===== Mock Implementations =====

    #[derive(Clone)]
    struct MockEmbeddingProvider {
        model_name: String,
        dimension: usize,
        state: Arc<Mutex<MockEmbeddingState>>,
    }

    #[derive(Default)]
    struct MockEmbeddingState {
        embed_batch_calls: Vec<Vec<String>>,
        should_fail: bool,
    }

    impl MockEmbeddingProvider {
        fn new(model_name: &str, dimension: usize) -> Self {
            Self {
                model_name: model_name.to_string(),
                dimension,
                state: Arc::new(Mutex::new(MockEmbeddingState::default())),
            }
        }

        fn with_failure(self) -> Self {
            self.state.lock().unwrap().should_fail = true;
            self
        }

        fn get_embed_batch_calls(&self) -> Vec<Vec<String>> {
            self.state.lock().unwrap().embed_batch_calls.clone()
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockEmbeddingProvider {
        async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
            Ok(self.embed_batch(&[text]).await?.remove(0))
        }

        async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            let mut state = self.state.lock().unwrap();
            state
                .embed_batch_calls
                .push(texts.iter().map(|s| s.to_string()).collect());

            if state.should_fail {
                return Err(EmbeddingError::ApiError("Mock embed_batch failure".to_string()));
            }
            Ok(texts.iter().map(|_| create_test_embedding(self.dimension)).collect())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            &self.model_name
        }
    }

    #[derive(Clone)]
    struct MockStorage {
        state: Arc<Mutex<MockStorageState>>,
    }

    struct MockStorageState {
        chunks: HashMap<i64, Chunk>,
        contents: HashSet<String>,
        config: Option<EmbeddingConfig>,
        next_id: i64,
        initialized: bool,
        fail_on_content: Option<String>,
    }

    impl Default for MockStorageState {
        fn default() -> Self {
            Self {
                chunks: HashMap::new(),
                contents: HashSet::new(),
                config: None,
                next_id: 1,
                initialized: false,
                fail_on_content: None,
            }
        }
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                state: Arc::new(Mutex::new(MockStorageState::default())),
            }
        }

        fn with_config(self, config: EmbeddingConfig) -> Self {
            {
                let mut state = self.state.lock().unwrap();
                state.config = Some(config);
                state.initialized = true;
            }
            self
        }

        fn with_existing_content(self, content: &str) -> Self {
            self.state.lock().unwrap().contents.insert(normalize_text(content));
            self
        }

        fn fail_insert_on(self, content: &str) -> Self {
            self.state.lock().unwrap().fail_on_content = Some(content.to_string());
            self
        }

        fn chunk_count(&self) -> usize {
            self.state.lock().unwrap().chunks.len()
        }
    }

    #[async_trait]
    impl ChunkStorage for MockStorage {
        async fn initialize(&mut self) -> StorageResult<()> {
            self.state.lock().unwrap().initialized = true;
            Ok(())
        }

        async fn store_config(&mut self, config: &EmbeddingConfig) -> StorageResult<()> {
            self.state.lock().unwrap().config = Some(config.clone());
            Ok(())
        }

        async fn get_config(&self) -> StorageResult<Option<EmbeddingConfig>> {
            Ok(self.state.lock().unwrap().config.clone())
        }

        async fn insert_chunk(&mut self, chunk: &Chunk) -> StorageResult<i64> {
            let mut state = self.state.lock().unwrap();

            if let Some(ref fail_content) = state.fail_on_content {
                if chunk.content.contains(fail_content.as_str()) {
                    return Err(StorageError::QueryError(format!(
                        "Mock insert failure for content containing '{}'",
                        fail_content
                    )));
                }
            }

            let normalized = normalize_text(&chunk.content);
            if state.contents.contains(&normalized) {
                return Err(StorageError::DuplicateEntry(normalized));
            }

            let id = state.next_id;
            state.next_id += 1;

            let mut stored = chunk.clone();
            stored.id = Some(id);
            state.chunks.insert(id, stored);
            state.contents.insert(normalized);
            Ok(id)
        }

        async fn exists_by_content(&self, normalized_content: &str) -> StorageResult<bool> {
            Ok(self.state.lock().unwrap().contents.contains(normalized_content))
        }

        async fn get_all_chunks(&self) -> StorageResult<Vec<Chunk>> {
            let state = self.state.lock().unwrap();
            let mut chunks: Vec<Chunk> = state.chunks.values().cloned().collect();
            chunks.sort_by_key(|c| c.id);
            Ok(chunks)
        }

        async fn get_chunk_by_id(&self, id: i64) -> StorageResult<Chunk> {
            self.state
                .lock()
                .unwrap()
                .chunks
                .get(&id)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(format!("Chunk {} not found", id)))
        }

        async fn count_chunks(&self) -> StorageResult<usize> {
            Ok(self.state.lock().unwrap().chunks.len())
        }
    }

    struct MockCatalogProvider {
        text: String,
        should_fail: bool,
    }

    #[async_trait]
    impl CatalogProvider for MockCatalogProvider {
        async fn fetch_text(&self) -> ProviderResult<String> {
            if self.should_fail {
                return Err(ProviderError::ParseError("Mock provider failure".to_string()));
            }
            Ok(self.text.clone())
        }

        fn name(&self) -> &str {
            "mock-catalog"
        }
    }

    // ===== Test Helper Functions =====

    fn create_test_embedding(dimension: usize) -> Vec<f32> {
        (0..dimension).map(|i| (i as f32) / (dimension as f32)).collect()
    }

    fn create_test_config(model: &str, dim: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            model_name: model.to_string(),
            dimension: dim,
        }
    }

    fn small_splitter() -> TextSplitter {
        TextSplitter::new(10, 0).unwrap()
    }

    // ===== Splitter Tests =====

    #[test]
    fn test_splitter_rejects_bad_overlap() {
        assert!(TextSplitter::new(100, 100).is_err());
        assert!(TextSplitter::new(0, 0).is_err());
        let splitter = TextSplitter::default();
        assert_eq!(splitter.chunk_size(), 1000);
        assert_eq!(splitter.chunk_overlap(), 200);
    }

    #[test]
    fn test_short_text_single_chunk() {
        let splitter = TextSplitter::default();
        assert_eq!(
            splitter.split_text("  Collection: A\n\nCollection: B  "),
            vec!["Collection: A\n\nCollection: B".to_string()]
        );
        assert!(splitter.split_text("   \n\n  ").is_empty());
    }

    #[test]
    fn test_word_merge_without_overlap() {
        let splitter = TextSplitter::new(10, 3).unwrap();
        assert_eq!(
            splitter.split_text("aaaa bbbb cccc dddd"),
            vec!["aaaa bbbb".to_string(), "cccc dddd".to_string()]
        );
    }

    #[test]
    fn test_overlap_carries_trailing_pieces() {
        let splitter = TextSplitter::new(10, 5).unwrap();
        assert_eq!(
            splitter.split_text("aa bb cc dd ee ff"),
            vec!["aa bb cc", "bb cc dd", "cc dd ee", "dd ee ff"]
        );
    }

    #[test]
    fn test_recursive_fallback_to_smaller_separators() {
        assert_eq!(
            small_splitter().split_text("short\n\nthis is way too long"),
            vec!["short", "this is", "way too", "long"]
        );
    }

    #[test]
    fn test_unbroken_text_split_by_character() {
        let splitter = TextSplitter::new(5, 0).unwrap();
        assert_eq!(splitter.split_text("abcdefghij"), vec!["abcde", "fghij"]);
    }

    #[test]
    fn test_chunks_respect_size() {
        let splitter = TextSplitter::new(50, 10).unwrap();
        let text = "Collection: Optimistic Library\nGrade: Kindergarten\nDescription: Books that build hope and resilience.\n\n"
            .repeat(6);
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.is_empty());
            assert_eq!(chunk, chunk.trim());
            assert!(chunk.chars().count() <= 50, "chunk too long: {:?}", chunk);
        }
    }

    // ===== Configuration Validation Tests =====

    #[tokio::test]
    async fn test_connect_with_matching_config() {
        let storage = MockStorage::new().with_config(create_test_config("test-model", 384));
        let provider = MockEmbeddingProvider::new("test-model", 384);

        let result = IngestionPipeline::connect(provider, storage, TextSplitter::default(), None).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_connect_without_config() {
        let provider = MockEmbeddingProvider::new("test-model", 384);
        let result =
            IngestionPipeline::connect(provider, MockStorage::new(), TextSplitter::default(), None).await;

        match result {
            Err(IngestionError::InvalidInput(msg)) => assert!(msg.contains("no embedding configuration")),
            _ => panic!("Expected InvalidInput error"),
        }
    }

    #[tokio::test]
    async fn test_connect_with_mismatched_model() {
        let storage = MockStorage::new().with_config(create_test_config("model-a", 384));
        let provider = MockEmbeddingProvider::new("model-b", 384);

        match IngestionPipeline::connect(provider, storage, TextSplitter::default(), None).await {
            Err(IngestionError::InvalidInput(msg)) => assert!(msg.contains("model mismatch")),
            _ => panic!("Expected model mismatch"),
        }
    }

    #[tokio::test]
    async fn test_connect_with_mismatched_dimension() {
        let storage = MockStorage::new().with_config(create_test_config("test-model", 384));
        let provider = MockEmbeddingProvider::new("test-model", 768);

        match IngestionPipeline::connect(provider, storage, TextSplitter::default(), None).await {
            Err(IngestionError::InvalidInput(msg)) => assert!(msg.contains("dimension mismatch")),
            _ => panic!("Expected dimension mismatch"),
        }
    }

    #[tokio::test]
    async fn test_initialize_new_stores_config() {
        let storage = MockStorage::new();
        let state = storage.state.clone();
        let provider = MockEmbeddingProvider::new("new-model", 512);

        IngestionPipeline::initialize_new(provider, storage, TextSplitter::default(), None)
            .await
            .unwrap();

        let state = state.lock().unwrap();
        assert!(state.initialized);
        assert_eq!(state.config, Some(create_test_config("new-model", 512)));
    }

    // ===== Ingestion Tests =====

    #[tokio::test]
    async fn test_ingest_text_inserts_chunks() {
        let storage = MockStorage::new();
        let provider = MockEmbeddingProvider::new("test-model", 4);
        let calls = provider.clone();
        let mut pipeline = IngestionPipeline::initialize_new(provider, storage.clone(), small_splitter(), None)
            .await
            .unwrap();

        let stats = pipeline
            .ingest_text("catalog.txt", "short\n\nthis is way too long")
            .await
            .unwrap();

        assert_eq!(
            stats,
            IngestionStats {
                total_processed: 4,
                inserted: 4,
                duplicates_skipped: 0,
                failed: 0,
            }
        );
        assert_eq!(storage.chunk_count(), 4);

        let batches = calls.get_embed_batch_calls();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], vec!["short", "this is", "way too", "long"]);

        let stored = pipeline.storage().get_all_chunks().await.unwrap();
        assert_eq!(stored[1].content, "this is");
        assert_eq!(stored[1].source, "catalog.txt");
        assert_eq!(stored[1].position, 1);
        assert_eq!(stored[1].embedding.as_ref().map(Vec::len), Some(4));
    }

    #[tokio::test]
    async fn test_duplicates_skipped_across_runs_and_within_text() {
        let storage = MockStorage::new()
            .with_config(create_test_config("test-model", 4))
            .with_existing_content("FRESH");
        let provider = MockEmbeddingProvider::new("test-model", 4);
        let mut pipeline = IngestionPipeline::connect(provider, storage.clone(), small_splitter(), None)
            .await
            .unwrap();

        // "already here" is longer than a chunk so it is split into words.
        let stats = pipeline
            .ingest_text("catalog.txt", "already here\n\nrepeat\n\nrepeat\n\nfresh")
            .await
            .unwrap();

        assert_eq!(stats.total_processed, 5);
        assert_eq!(stats.inserted, 3);
        assert_eq!(stats.duplicates_skipped, 2);
        assert_eq!(storage.chunk_count(), 3);

        let rerun = pipeline.ingest_text("catalog.txt", "Here").await.unwrap();
        assert_eq!(rerun.duplicates_skipped, 1);
        assert_eq!(rerun.inserted, 0);
    }

    #[tokio::test]
    async fn test_batch_size_splits_embedding_calls() {
        let provider = MockEmbeddingProvider::new("test-model", 2);
        let calls = provider.clone();
        let mut pipeline =
            IngestionPipeline::initialize_new(provider, MockStorage::new(), small_splitter(), Some(2))
                .await
                .unwrap();

        let stats = pipeline.ingest_text("c", "one\n\ntwo\n\nthree").await.unwrap();
        assert_eq!(stats.inserted, 2);
        assert_eq!(calls.get_embed_batch_calls().len(), 1);

        let stats = pipeline
            .ingest_text("c", "alpha beta gamma delta epsilon")
            .await
            .unwrap();
        assert_eq!(stats.inserted, 4);
        assert_eq!(calls.get_embed_batch_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_insert_failure_counted() {
        let storage = MockStorage::new().fail_insert_on("bad");
        let provider = MockEmbeddingProvider::new("test-model", 2);
        let mut pipeline = IngestionPipeline::initialize_new(provider, storage, small_splitter(), None)
            .await
            .unwrap();

        let stats = pipeline
            .ingest_text("c", "good one\n\nbad apple\n\nfine day")
            .await
            .unwrap();
        assert_eq!(stats.total_processed, 3);
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_error() {
        let provider = MockEmbeddingProvider::new("test-model", 2).with_failure();
        let storage = MockStorage::new();
        let mut pipeline = IngestionPipeline::initialize_new(provider, storage.clone(), small_splitter(), None)
            .await
            .unwrap();

        let result = pipeline.ingest_text("c", "some text").await;
        assert!(matches!(result, Err(IngestionError::EmbeddingError(_))));
        assert_eq!(storage.chunk_count(), 0);
    }

    #[tokio::test]
    async fn test_ingest_from_provider() {
        let provider = MockEmbeddingProvider::new("test-model", 2);
        let storage = MockStorage::new();
        let mut pipeline = IngestionPipeline::initialize_new(provider, storage, small_splitter(), None)
            .await
            .unwrap();

        let catalog = MockCatalogProvider {
            text: "Grade: K\n\nGrade: 1".to_string(),
            should_fail: false,
        };
        let stats = pipeline.ingest_from_provider(&catalog).await.unwrap();
        assert_eq!(stats.inserted, 2);

        let stored = pipeline.into_storage().get_all_chunks().await.unwrap();
        assert!(stored.iter().all(|c| c.source == "mock-catalog"));

        let failing = MockCatalogProvider {
            text: String::new(),
            should_fail: true,
        };
        let provider = MockEmbeddingProvider::new("test-model", 2);
        let mut pipeline =
            IngestionPipeline::initialize_new(provider, MockStorage::new(), small_splitter(), None)
                .await
                .unwrap();
        let result = pipeline.ingest_from_provider(&failing).await;
        assert!(matches!(result, Err(IngestionError::ProviderError(_))));
    }

    #[test]
    fn test_stats_merge() {
        let mut total = IngestionStats::new();
        total.record_inserted();
        let mut other = IngestionStats::new();
        other.record_duplicate();
        other.record_failed();
        total.merge(&other);
        assert_eq!(total.total_processed, 3);
        assert_eq!(total.inserted, 1);
        assert_eq!(total.duplicates_skipped, 1);
        assert_eq!(total.failed, 1);
    }
}
