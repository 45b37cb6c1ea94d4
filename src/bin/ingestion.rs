//! Ingestion binary entry point.
//!
//! Splits the catalog file into chunks, embeds them and writes them to the
//! SQLite index that `book-boss` searches.
//!
//! # Examples
//!
//! Initialize a new index:
//! ```bash
//! ingestion --mode init-new --input data/book_entries.txt --db-path book_index.db
//! ```
//!
//! Add a revised catalog to an existing index:
//! ```bash
//! ingestion --input data/book_entries.txt
//! ```

use anyhow::{Context, Result};
use book_boss::{
    catalog::Catalog,
    config::{self, AppConfig},
    embedding::{DynamicEmbeddingProvider, EmbeddingProvider, EmbeddingProviderKind},
    ingestion::{IngestionPipeline, TextSplitter},
    provider::{text::TextFileCatalogProvider, CatalogProvider},
    storage::sqlite::SqliteStorage,
};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Operation mode for the ingestion pipeline
#[derive(Debug, Clone, ValueEnum)]
enum Mode {
    /// Connect to existing index and validate embedding config (default)
    Connect,
    /// Initialize new index with fresh schema
    InitNew,
}

/// Ingestion CLI for building and updating the catalog index
#[derive(Parser, Debug)]
#[command(
    name = "ingestion",
    version,
    about = "Build and update the book catalog index",
    long_about = "Ingestion pipeline that splits the book catalog into chunks, generates embeddings, and stores them for retrieval.

EXAMPLES:
  Initialize new index:
    ingestion --mode init-new --input data/book_entries.txt --db-path book_index.db

  Add a revised catalog to an existing index:
    ingestion --input data/book_entries.txt

  Use OpenAI embeddings:
    OPENAI_API_KEY=sk-... ingestion --mode init-new --embedding-provider openai

  Smaller chunks and debug logging:
    ingestion --chunk-size 500 --chunk-overlap 100 --log-level debug"
)]
struct IngestionArgs {
    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Catalog text file (defaults to the configured catalog_path)
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Index database file path
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,

    /// Operation mode: connect to existing index or initialize a new one
    #[arg(long, value_enum, default_value = "connect")]
    mode: Mode,

    /// Embedding provider to use (fastembed or openai)
    #[arg(long, value_name = "PROVIDER")]
    embedding_provider: Option<EmbeddingProviderKind>,

    /// Specific embedding model name (provider-dependent, optional)
    #[arg(long, value_name = "MODEL")]
    embedding_model: Option<String>,

    /// Chunk length in characters
    #[arg(long, value_name = "N")]
    chunk_size: Option<usize>,

    /// Characters shared between neighbouring chunks
    #[arg(long, value_name = "N")]
    chunk_overlap: Option<usize>,

    /// Number of chunks per embedding request
    #[arg(long, value_name = "N", default_value = "32")]
    batch_size: usize,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// FastEmbed model cache directory
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,
}

impl IngestionArgs {
    /// Layer command-line flags over the loaded configuration.
    fn apply_to(&self, config: &mut AppConfig) {
        if let Some(input) = &self.input {
            config.catalog_path = input.clone();
        }
        if let Some(db_path) = &self.db_path {
            config.db_path = db_path.clone();
        }
        if let Some(kind) = self.embedding_provider {
            config.embedding_provider = kind;
        }
        if let Some(model) = &self.embedding_model {
            config.embedding_model = Some(model.clone());
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(chunk_overlap) = self.chunk_overlap {
            config.chunk_overlap = chunk_overlap;
        }
        if let Some(cache_dir) = &self.cache_dir {
            config.model_cache_dir = Some(cache_dir.clone());
        }
    }
}

/// Initialize logging subsystem with the specified level
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Create an embedding provider from the resolved configuration
fn create_embedding_provider(config: &AppConfig) -> Result<DynamicEmbeddingProvider> {
    info!("Initializing {} embedding provider", config.embedding_provider);

    let cache_dir = config.cache_dir();
    debug!("Using model cache directory: {}", cache_dir);

    let provider = DynamicEmbeddingProvider::for_kind(
        config.embedding_provider,
        config.embedding_model.clone(),
        config::api_key(),
        &config.openai_base_url,
        Some(cache_dir),
    )
    .context("Failed to initialize embedding provider")?;

    info!(
        "Embedding provider initialized: model={}, dimension={}",
        provider.model_name(),
        provider.dimension()
    );
    Ok(provider)
}

/// Create storage instance
fn create_storage(db_path: &Path) -> Result<SqliteStorage> {
    debug!("Creating SQLite storage at: {}", db_path.display());

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
            info!("Created database directory: {:?}", parent);
        }
    }

    SqliteStorage::open(db_path.to_string_lossy().into_owned())
        .with_context(|| format!("Failed to open database {}", db_path.display()))
}

/// Create and initialize the ingestion pipeline based on mode
async fn create_pipeline(
    mode: &Mode,
    batch_size: usize,
    splitter: TextSplitter,
    embedding_provider: DynamicEmbeddingProvider,
    storage: SqliteStorage,
) -> Result<IngestionPipeline<DynamicEmbeddingProvider, SqliteStorage>> {
    let pipeline = match mode {
        Mode::Connect => {
            info!("Connecting to existing index with config validation");
            IngestionPipeline::connect(embedding_provider, storage, splitter, Some(batch_size))
                .await
                .context("Failed to connect to existing index. Use --mode init-new to create a new index.")?
        }
        Mode::InitNew => {
            info!("Initializing new index");
            IngestionPipeline::initialize_new(embedding_provider, storage, splitter, Some(batch_size))
                .await
                .context("Failed to initialize new index")?
        }
    };

    debug!("Pipeline created with batch_size={}", batch_size);
    Ok(pipeline)
}

/// Create a progress bar for tracking ingestion
fn create_progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} chunks | Inserted: {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    pb.set_style(style);
    pb
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = IngestionArgs::parse();

    init_logging(&args.log_level).context("Failed to initialize logging")?;

    info!("Starting catalog ingestion pipeline");
    debug!("CLI arguments: {:?}", args);

    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply_to(&mut config);
    config.validate().context("Invalid configuration")?;

    let start_time = Instant::now();

    if !config.catalog_path.exists() {
        error!("Catalog file does not exist: {:?}", config.catalog_path);
        anyhow::bail!("Catalog file not found: {:?}", config.catalog_path);
    }
    info!("Catalog file: {:?}", config.catalog_path);

    let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap)
        .context("Invalid chunking configuration")?;
    let embedding_provider = create_embedding_provider(&config)?;
    let storage = create_storage(&config.db_path).context("Failed to create storage")?;
    info!("Database path: {}", config.db_path.display());

    let mut pipeline = create_pipeline(&args.mode, args.batch_size, splitter.clone(), embedding_provider, storage)
        .await
        .context("Failed to create ingestion pipeline")?;

    let provider = TextFileCatalogProvider::new(&config.catalog_path)
        .with_context(|| format!("Failed to open catalog {:?}", config.catalog_path))?;
    let text = provider
        .fetch_text()
        .await
        .with_context(|| format!("Failed to read catalog {:?}", config.catalog_path))?;

    info!("Catalog lists {} collections", Catalog::parse(&text).len());

    let chunk_count = splitter.split_text(&text).len();
    if chunk_count == 0 {
        warn!("Catalog file is empty; nothing to ingest");
        return Ok(());
    }
    info!(
        "Split catalog into {} chunks (size={}, overlap={})",
        chunk_count,
        splitter.chunk_size(),
        splitter.chunk_overlap()
    );

    let progress = create_progress_bar(chunk_count);
    progress.set_message("0");

    let stats = pipeline
        .ingest_text(provider.name(), &text)
        .await
        .context("Failed to ingest catalog")?;

    progress.set_position(stats.total_processed as u64);
    progress.finish_with_message(format!("{}", stats.inserted));

    let elapsed = start_time.elapsed();
    println!("\n╔════════════════════════════════════════╗");
    println!("║      Ingestion Completed               ║");
    println!("╠════════════════════════════════════════╣");
    println!("║ Total processed:      {:>16} ║", stats.total_processed);
    println!("║ Inserted:             {:>16} ║", stats.inserted);
    println!("║ Duplicates skipped:   {:>16} ║", stats.duplicates_skipped);
    println!("║ Failed:               {:>16} ║", stats.failed);
    println!("║ Elapsed time:         {:>13.2?} ║", elapsed);
    println!("╚════════════════════════════════════════╝");

    if stats.failed > 0 {
        warn!("{} chunks failed to store - check logs for details", stats.failed);
    }

    info!("Ingestion pipeline completed successfully");

    Ok(())
}
