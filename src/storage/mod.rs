//! Storage layer abstraction and implementations.
//!
//! This module defines the interface for persisting the retrieval index (catalog
//! chunks with their embeddings) and the optional search history. The
//! abstraction keeps the retriever and ingestion pipeline independent of the
//! backend.

pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Chunk, EmbeddingConfig};
use crate::session::SearchRecord;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error
    #[error("Query execution failed: {0}")]
    QueryError(String),

    /// Data serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Schema or migration error
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Duplicate entry (same normalized chunk text already indexed)
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Other unexpected errors
    #[error("Unexpected storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for chunk index backends.
#[async_trait]
pub trait ChunkStorage: Send + Sync {
    /// Initialize the storage (create tables, indexes, etc.).
    ///
    /// This should be idempotent and safe to call multiple times.
    async fn initialize(&mut self) -> StorageResult<()>;

    /// Persist the embedding configuration used to build the index.
    async fn store_config(&mut self, config: &EmbeddingConfig) -> StorageResult<()>;

    /// Retrieve the embedding configuration, or None if not set.
    async fn get_config(&self) -> StorageResult<Option<EmbeddingConfig>>;

    /// Insert a chunk and return its assigned id.
    ///
    /// # Errors
    /// Returns `StorageError::DuplicateEntry` if a chunk with the same
    /// normalized content already exists
    async fn insert_chunk(&mut self, chunk: &Chunk) -> StorageResult<i64>;

    /// Check whether a chunk with this normalized content is already indexed.
    async fn exists_by_content(&self, normalized_content: &str) -> StorageResult<bool>;

    /// Retrieve every chunk with its embedding, ordered by id.
    async fn get_all_chunks(&self) -> StorageResult<Vec<Chunk>>;

    /// Get a chunk by its id.
    ///
    /// # Errors
    /// Returns `StorageError::NotFound` if the chunk doesn't exist
    async fn get_chunk_by_id(&self, id: i64) -> StorageResult<Chunk>;

    /// Number of indexed chunks.
    async fn count_chunks(&self) -> StorageResult<usize>;
}

/// Trait for persisting submitted searches.
#[async_trait]
pub trait SearchHistoryStore: Send + Sync {
    /// Append a search and return its row id.
    async fn save_search(&self, record: &SearchRecord) -> StorageResult<i64>;

    /// Most recent searches first.
    async fn recent_searches(&self, limit: usize) -> StorageResult<Vec<SearchRecord>>;
}
