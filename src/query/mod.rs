//! Retrieval and answer synthesis.
//!
//! The retriever embeds the query, scores every indexed chunk by cosine
//! similarity and keeps the top-k. The QA chain "stuffs" those chunks into a
//! single prompt and asks the completion provider to answer from them.
//!
//! # Usage
//!
//! ```rust,no_run
//! use book_boss::embedding::fastembed::FastEmbedProvider;
//! use book_boss::llm::openai::{ChatSettings, OpenAIChat};
//! use book_boss::query::{BruteForceRetriever, QuestionAnswerer, RetrievalQa};
//! use book_boss::storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = SqliteStorage::open("book_index.db")?;
//! let retriever = BruteForceRetriever::new(FastEmbedProvider::with_defaults()?, storage);
//! let chat = OpenAIChat::new("api-key".to_string(), ChatSettings::default())?;
//! let qa = RetrievalQa::new(retriever, chat, 4);
//!
//! let answer = qa.ask("Find books for 2nd Grade students about friendship in Reading.").await?;
//! println!("{}", answer.text);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::embedding::{normalize_text, EmbeddingProvider};
use crate::llm::CompletionProvider;
use crate::models::RetrievedChunk;
use crate::storage::ChunkStorage;

/// Instruction given to the model with every stuffed prompt.
pub const QA_SYSTEM_PROMPT: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

/// Errors that can occur during retrieval or answering.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    /// Storage access failed
    #[error("Storage error: {0}")]
    StorageError(String),

    /// The language model call failed
    #[error("Completion error: {0}")]
    CompletionError(String),

    /// Invalid query parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The stored index cannot be searched with this query embedding
    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    /// No answerer could be set up (missing API key, index not built)
    #[error("Answering unavailable: {0}")]
    Unavailable(String),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Retrieval parameters.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// The query text (normalized before embedding)
    pub query: String,

    /// Maximum number of chunks to return
    pub top_k: usize,
}

impl SearchQuery {
    pub const DEFAULT_TOP_K: usize = 4;

    pub fn new(query: impl Into<String>, top_k: Option<usize>) -> Self {
        Self {
            query: query.into(),
            top_k: top_k.unwrap_or(Self::DEFAULT_TOP_K),
        }
    }
}

/// Cosine similarity between two vectors of equal length.
///
/// Returns 0.0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have the same length");

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot_product / (norm_a * norm_b)
}

/// Trait for chunk retrievers.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return the most similar chunks, highest score first.
    ///
    /// # Errors
    /// Returns `QueryError` if embedding or storage access fails
    async fn retrieve(&self, query: &SearchQuery) -> QueryResult<Vec<RetrievedChunk>>;
}

/// Scans every stored chunk; fine for a catalog-sized index.
pub struct BruteForceRetriever<E, S>
where
    E: EmbeddingProvider,
    S: ChunkStorage,
{
    embedding_provider: E,
    storage: S,
}

impl<E, S> BruteForceRetriever<E, S>
where
    E: EmbeddingProvider,
    S: ChunkStorage,
{
    pub fn new(embedding_provider: E, storage: S) -> Self {
        Self {
            embedding_provider,
            storage,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

#[async_trait]
impl<E, S> Retriever for BruteForceRetriever<E, S>
where
    E: EmbeddingProvider,
    S: ChunkStorage,
{
    async fn retrieve(&self, query: &SearchQuery) -> QueryResult<Vec<RetrievedChunk>> {
        if query.top_k == 0 {
            return Err(QueryError::InvalidQuery("top_k must be at least 1".to_string()));
        }

        let normalized_query = normalize_text(&query.query);
        let query_embedding = self
            .embedding_provider
            .embed(&normalized_query)
            .await
            .map_err(|e| QueryError::EmbeddingError(e.to_string()))?;

        let chunks = self
            .storage
            .get_all_chunks()
            .await
            .map_err(|e| QueryError::StorageError(e.to_string()))?;

        let mut results = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let score = match chunk.embedding.as_deref() {
                Some(embedding) if embedding.len() == query_embedding.len() => {
                    cosine_similarity(&query_embedding, embedding)
                }
                Some(embedding) => {
                    return Err(QueryError::InvalidIndex(format!(
                        "chunk {:?} has {} dimensions, query has {}",
                        chunk.id,
                        embedding.len(),
                        query_embedding.len()
                    )))
                }
                None => {
                    return Err(QueryError::InvalidIndex(format!(
                        "chunk {:?} has no embedding",
                        chunk.id
                    )))
                }
            };
            results.push(RetrievedChunk::new(chunk, score));
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(query.top_k);

        debug!("Retrieved {} chunks for '{}'", results.len(), query.query);
        Ok(results)
    }
}

/// A synthesized answer and the chunks it was built from.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    pub text: String,
    pub sources: Vec<RetrievedChunk>,
}

/// Trait for anything that answers a free-text question.
#[async_trait]
pub trait QuestionAnswerer: Send + Sync {
    /// # Errors
    /// Returns `QueryError::InvalidQuery` for a blank question, otherwise
    /// whatever retrieval or completion fails with
    async fn ask(&self, question: &str) -> QueryResult<Answer>;
}

/// Retrieve-then-stuff question answering.
pub struct RetrievalQa<R, C>
where
    R: Retriever,
    C: CompletionProvider,
{
    retriever: R,
    completion: C,
    top_k: usize,
}

impl<R, C> RetrievalQa<R, C>
where
    R: Retriever,
    C: CompletionProvider,
{
    pub fn new(retriever: R, completion: C, top_k: usize) -> Self {
        Self {
            retriever,
            completion,
            top_k,
        }
    }

    pub fn retriever(&self) -> &R {
        &self.retriever
    }
}

/// Join retrieved chunks into the user message of the stuffed prompt.
pub fn build_prompt(question: &str, sources: &[RetrievedChunk]) -> String {
    let context = sources
        .iter()
        .map(|source| source.chunk.content.trim())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{}\n\nQuestion: {}\nHelpful Answer:", context, question)
}

#[async_trait]
impl<R, C> QuestionAnswerer for RetrievalQa<R, C>
where
    R: Retriever,
    C: CompletionProvider,
{
    async fn ask(&self, question: &str) -> QueryResult<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::InvalidQuery("question is empty".to_string()));
        }

        let sources = self
            .retriever
            .retrieve(&SearchQuery::new(question, Some(self.top_k)))
            .await?;

        let prompt = build_prompt(question, &sources);
        debug!(
            "Asking {} with {} context chunks",
            self.completion.model_name(),
            sources.len()
        );

        let text = self
            .completion
            .complete(QA_SYSTEM_PROMPT, &prompt)
            .await
            .map_err(|e| QueryError::CompletionError(e.to_string()))?;

        Ok(Answer {
            question: question.to_string(),
            text,
            sources,
        })
    }
}
