//! Plain text file catalog provider.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{CatalogProvider, ProviderError, ProviderResult};

/// Reads a UTF-8 catalog file from disk.
#[derive(Debug, Clone)]
pub struct TextFileCatalogProvider {
    path: PathBuf,
    name: String,
}

impl TextFileCatalogProvider {
    /// Create a provider for the given file.
    ///
    /// # Errors
    /// Returns `ProviderError::ConfigError` if the path does not point at a file
    pub fn new(path: impl Into<PathBuf>) -> ProviderResult<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(ProviderError::ConfigError(format!(
                "catalog file not found: {}",
                path.display()
            )));
        }

        let name = path.display().to_string();
        Ok(Self { path, name })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CatalogProvider for TextFileCatalogProvider {
    async fn fetch_text(&self) -> ProviderResult<String> {
        debug!("Reading catalog from {}", self.path.display());
        let bytes = tokio::fs::read(&self.path).await?;
        String::from_utf8(bytes).map_err(|e| {
            ProviderError::ParseError(format!(
                "catalog {} is not valid UTF-8: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
