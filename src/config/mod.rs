//! Application configuration.
//!
//! ## Configuration Sources (in precedence order, last wins)
//!
//! 1. Built-in defaults
//! 2. JSON file passed with `--config`
//! 3. `BOOK_BOSS_*` environment variables (a `.env` file is loaded first)
//! 4. Command-line flags, applied by the binaries
//!
//! The OpenAI API key is never stored in the config; it is read from
//! `OPENAI_API_KEY`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embedding::EmbeddingProviderKind;
use crate::llm::openai::ChatSettings;

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "BOOK_BOSS_";

/// Environment variable holding the OpenAI API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings shared by both binaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Flat-text catalog of collections
    pub catalog_path: PathBuf,

    /// SQLite file holding the chunk index (and search history)
    pub db_path: PathBuf,

    pub embedding_provider: EmbeddingProviderKind,

    /// Embedding model; `None` uses the provider's default
    pub embedding_model: Option<String>,

    /// Where fastembed keeps downloaded model files
    pub model_cache_dir: Option<PathBuf>,

    pub chat_model: String,
    pub temperature: f32,

    /// Number of chunks handed to the language model
    pub top_k: usize,

    pub chunk_size: usize,
    pub chunk_overlap: usize,

    pub openai_base_url: String,
    pub request_timeout_secs: u64,

    /// Persist searches to the `searches` table
    pub record_history: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("data/book_entries.txt"),
            db_path: PathBuf::from("book_index.db"),
            embedding_provider: EmbeddingProviderKind::FastEmbed,
            embedding_model: None,
            model_cache_dir: None,
            chat_model: crate::DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.2,
            top_k: 4,
            chunk_size: crate::ingestion::DEFAULT_CHUNK_SIZE,
            chunk_overlap: crate::ingestion::DEFAULT_CHUNK_OVERLAP,
            openai_base_url: crate::embedding::openai::DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 30,
            record_history: false,
        }
    }
}

impl AppConfig {
    /// Defaults, then the optional JSON file, then the process environment.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed, or an
    /// environment variable holds an unparseable value
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Read a JSON config file; missing fields take their defaults.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `BOOK_BOSS_*` overrides looked up through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            let key = format!("{}{}", ENV_PREFIX, name);
            lookup(&key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(|value| (key, value))
        };

        if let Some((_, value)) = get("CATALOG_PATH") {
            self.catalog_path = PathBuf::from(value);
        }
        if let Some((_, value)) = get("DB_PATH") {
            self.db_path = PathBuf::from(value);
        }
        if let Some((key, value)) = get("EMBEDDING_PROVIDER") {
            self.embedding_provider = parse_value(&key, &value)?;
        }
        if let Some((_, value)) = get("EMBEDDING_MODEL") {
            self.embedding_model = Some(value);
        }
        if let Some((_, value)) = get("MODEL_CACHE_DIR") {
            self.model_cache_dir = Some(PathBuf::from(value));
        }
        if let Some((_, value)) = get("CHAT_MODEL") {
            self.chat_model = value;
        }
        if let Some((key, value)) = get("TEMPERATURE") {
            self.temperature = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = get("TOP_K") {
            self.top_k = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = get("CHUNK_SIZE") {
            self.chunk_size = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = get("CHUNK_OVERLAP") {
            self.chunk_overlap = parse_value(&key, &value)?;
        }
        if let Some((_, value)) = get("OPENAI_BASE_URL") {
            self.openai_base_url = value;
        }
        if let Some((key, value)) = get("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = get("RECORD_HISTORY") {
            self.record_history = parse_bool(&key, &value)?;
        }

        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be at least 1".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be at least 1".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }
        Ok(())
    }

    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            model: self.chat_model.clone(),
            temperature: self.temperature,
            base_url: self.openai_base_url.clone(),
            timeout_seconds: self.request_timeout_secs,
        }
    }

    /// Model cache directory as the string fastembed expects.
    ///
    /// Defaults to `fastembed` under the platform cache directory.
    pub fn cache_dir(&self) -> String {
        match &self.model_cache_dir {
            Some(dir) => dir.to_string_lossy().into_owned(),
            None => dirs::cache_dir()
                .map(|dir| dir.join("fastembed").to_string_lossy().into_owned())
                .unwrap_or_else(|| ".cache/fastembed".to_string()),
        }
    }
}

/// The OpenAI API key from the environment, if set and non-empty.
pub fn api_key() -> Option<String> {
    std::env::var(API_KEY_ENV)
        .ok()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
}

fn parse_value<T>(key: &str, value: &str) -> ConfigResult<T>
where
    T: std::str::FromStr,
{
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> ConfigResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.catalog_path, PathBuf::from("data/book_entries.txt"));
        assert_eq!(config.chat_model, "gpt-4o-mini");
        assert_eq!(config.top_k, 4);
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.embedding_provider, EmbeddingProviderKind::FastEmbed);
        assert!(!config.record_history);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"top_k": 6, "embedding_provider": "openai", "record_history": true}}"#).unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.top_k, 6);
        assert_eq!(config.embedding_provider, EmbeddingProviderKind::OpenAI);
        assert!(config.record_history);
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.openai_base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_bad_file() {
        let missing = AppConfig::from_file(Path::new("/definitely/not/here.json"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(AppConfig::from_file(file.path()), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("BOOK_BOSS_TOP_K", "8"),
                ("BOOK_BOSS_TEMPERATURE", "0.7"),
                ("BOOK_BOSS_CHAT_MODEL", "gpt-4o"),
                ("BOOK_BOSS_RECORD_HISTORY", "yes"),
                ("BOOK_BOSS_EMBEDDING_MODEL", "  "),
                ("BOOK_BOSS_DB_PATH", "/tmp/books.db"),
            ]))
            .unwrap();

        assert_eq!(config.top_k, 8);
        assert!((config.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.chat_model, "gpt-4o");
        assert!(config.record_history);
        assert_eq!(config.embedding_model, None);
        assert_eq!(config.db_path, PathBuf::from("/tmp/books.db"));
    }

    #[test]
    fn test_env_invalid_value() {
        let mut config = AppConfig::default();
        let err = config.apply_env(env(&[("BOOK_BOSS_TOP_K", "many")])).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, value } => {
                assert_eq!(key, "BOOK_BOSS_TOP_K");
                assert_eq!(value, "many");
            }
            other => panic!("Expected InvalidValue, got {:?}", other),
        }

        let err = config
            .apply_env(env(&[("BOOK_BOSS_RECORD_HISTORY", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_validate() {
        let config = AppConfig {
            top_k: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            chunk_overlap: 1000,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            temperature: 2.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chat_settings() {
        let config = AppConfig {
            chat_model: "gpt-4o".to_string(),
            request_timeout_secs: 12,
            ..Default::default()
        };
        let settings = config.chat_settings();
        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(settings.timeout_seconds, 12);
        assert!((settings.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_cache_dir() {
        let config = AppConfig {
            model_cache_dir: Some(PathBuf::from("/tmp/models")),
            ..Default::default()
        };
        assert_eq!(config.cache_dir(), "/tmp/models");
        assert!(AppConfig::default().cache_dir().ends_with("fastembed"));
    }
}
