//! Catalog provider module.
//!
//! This module defines the interface for sourcing catalog text and includes an
//! implementation for local text files.
//!
//! The `CatalogProvider` trait abstracts where the catalog comes from, so the
//! ingestion pipeline and the interactive front end can load it the same way.

use async_trait::async_trait;
use thiserror::Error;

use crate::catalog::parse_book_entries;
use crate::models::Collection;

pub mod text;

/// Errors that can occur when loading a catalog.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Failed to read from the data source
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse the data format
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Trait for sourcing catalog text.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Fetch the full catalog text.
    ///
    /// # Errors
    /// Returns `ProviderError` if the catalog cannot be read
    async fn fetch_text(&self) -> ProviderResult<String>;

    /// Fetch and parse the catalog into collections.
    async fn fetch_collections(&self) -> ProviderResult<Vec<Collection>> {
        let text = self.fetch_text().await?;
        Ok(parse_book_entries(&text))
    }

    /// Human-readable name of the source, used for logging and as the chunk source.
    fn name(&self) -> &str;
}
