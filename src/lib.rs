//! Book Boss - a grade/subject/theme book-collection finder.
//!
//! This library provides the core functionality behind the `book-boss` and
//! `ingestion` binaries: it parses a flat text catalog of book collections,
//! indexes it for embedding retrieval, and answers "which books fit this
//! class?" questions with a language model.
//!
//! # Architecture
//!
//! - **models**: Core data structures (grades, subjects, collections, chunks)
//! - **catalog**: Catalog file parser and lookups
//! - **filters**: Grade normalization and keyword search
//! - **provider**: Catalog sources
//! - **embedding**: Text embedding generation and normalization
//! - **llm**: Chat-completion access
//! - **storage**: SQLite chunk index and search history
//! - **ingestion**: Text splitting and the offline indexing pipeline
//! - **query**: Retrieval and answer synthesis
//! - **cart**: Prices, cart and checkout
//! - **session**: In-memory search log and CSV export
//! - **app**: The facade used by front ends
//! - **config**: Layered configuration
//!
//! # Workflow
//!
//! ## Offline Ingestion
//!
//! 1. Read the catalog text
//! 2. Split it into overlapping chunks
//! 3. Skip chunks already indexed (by normalized text)
//! 4. Embed and store the rest
//!
//! ## Online Search
//!
//! 1. Turn the grade/subject/theme selection into a question
//! 2. Embed the question and rank stored chunks by cosine similarity
//! 3. Stuff the top chunks into a prompt and ask the model
//! 4. Log the search and show the answer with its sources
//!
//! # Example
//!
//! ```ignore
//! use book_boss::{
//!     app::BookBoss,
//!     catalog::Catalog,
//!     embedding::fastembed::FastEmbedProvider,
//!     llm::openai::{ChatSettings, OpenAIChat},
//!     models::{GradeLevel, SearchRequest, Subject},
//!     query::{BruteForceRetriever, RetrievalQa},
//!     storage::sqlite::SqliteStorage,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = SqliteStorage::open("book_index.db")?;
//!     let retriever = BruteForceRetriever::new(FastEmbedProvider::with_defaults()?, storage);
//!     let chat = OpenAIChat::new(api_key, ChatSettings::default())?;
//!     let catalog = Catalog::parse(&std::fs::read_to_string("data/book_entries.txt")?);
//!
//!     let mut boss = BookBoss::new(RetrievalQa::new(retriever, chat, 4), catalog);
//!     let request = SearchRequest::new(GradeLevel::Fifth, Subject::Science, "Innovation");
//!     let response = boss.generate_book_list(&request).await?;
//!     println!("{}", response.answer);
//!
//!     Ok(())
//! }
//! ```

// Public modules
pub mod app;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod embedding;
pub mod filters;
pub mod ingestion;
pub mod llm;
pub mod models;
pub mod provider;
pub mod query;
pub mod session;
pub mod storage;

// Re-export commonly used types at the crate root
pub use app::{BookBoss, BookListResponse};
pub use catalog::Catalog;
pub use config::AppConfig;
pub use embedding::EmbeddingProvider;
pub use models::{Book, Collection, EmbeddingConfig, GradeLevel, RelevanceLevel, SearchRequest, Subject};
pub use query::{QuestionAnswerer, Retriever, SearchQuery};
pub use storage::{ChunkStorage, SearchHistoryStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default OpenAI embedding model name
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default chat model used for answer synthesis
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
