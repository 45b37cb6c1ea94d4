//! Book Boss binary entry point.
//!
//! Command-line front end over a pre-built catalog index. It supports a
//! single-shot mode (one book list or one keyword search) and an interactive
//! REPL with the cart, the session log and its charts.
//!
//! # Examples
//!
//! One book list:
//! ```bash
//! book-boss --grade "3rd Grade" --subject Science --theme Innovation
//! ```
//!
//! Keyword search as JSON:
//! ```bash
//! book-boss --find dinosaurs --format json
//! ```
//!
//! Interactive mode:
//! ```bash
//! book-boss --interactive --record-history
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use book_boss::{
    app::{BookBoss, BookListResponse},
    cart::{Cart, Receipt},
    catalog::Catalog,
    config::{self, AppConfig},
    embedding::DynamicEmbeddingProvider,
    llm::openai::OpenAIChat,
    models::{Book, Collection, GradeLevel, SearchRequest, Subject},
    provider::{text::TextFileCatalogProvider, CatalogProvider},
    query::{Answer, BruteForceRetriever, QueryError, QueryResult, QuestionAnswerer, RetrievalQa},
    session::SearchRecord,
    storage::{sqlite::SqliteStorage, ChunkStorage, SearchHistoryStore},
};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type Answerer = RetrievalQa<BruteForceRetriever<DynamicEmbeddingProvider, SqliteStorage>, OpenAIChat>;

const CHART_WIDTH: usize = 40;
const HISTORY_LIMIT: usize = 20;

/// Output format for results
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-friendly tables
    Table,
    /// Machine-readable JSON format
    Json,
}

/// Book Boss CLI for finding book collections for a class
#[derive(Parser, Debug)]
#[command(
    name = "book-boss",
    version,
    about = "Find book collections by grade, subject and theme",
    long_about = "Ask for book collections that fit a grade, subject and theme, search the \
                  catalog by keyword, and build an order in the cart.

EXAMPLES:
  One book list:
    book-boss --grade \"3rd Grade\" --subject Science --theme Innovation

  Keyword search as JSON:
    book-boss --find dinosaurs --format json

  Interactive mode with persisted history:
    book-boss --interactive --record-history"
)]
struct Args {
    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Index database file path
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,

    /// Catalog text file
    #[arg(long, value_name = "FILE")]
    catalog: Option<PathBuf>,

    /// Grade level for a single book list
    #[arg(long, value_name = "GRADE", requires = "subject")]
    grade: Option<GradeLevel>,

    /// Subject for a single book list
    #[arg(long, value_name = "SUBJECT", requires = "grade")]
    subject: Option<Subject>,

    /// Theme for a single book list
    #[arg(long, value_name = "TEXT", default_value = "")]
    theme: String,

    /// Keyword to look for in book descriptions
    #[arg(long, value_name = "KEYWORD", conflicts_with = "interactive")]
    find: Option<String>,

    /// Number of catalog chunks given to the model
    #[arg(long, value_name = "N")]
    top_k: Option<usize>,

    /// Chat model used to write the answer
    #[arg(long, value_name = "MODEL")]
    chat_model: Option<String>,

    /// Sampling temperature for the chat model
    #[arg(long, value_name = "T")]
    temperature: Option<f32>,

    /// Persist every search to the database
    #[arg(long)]
    record_history: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Enable interactive REPL mode
    #[arg(long, short = 'i')]
    interactive: bool,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,

    /// FastEmbed model cache directory (only used with FastEmbed models)
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,
}

impl Args {
    /// Layer command-line flags over the loaded configuration.
    fn apply_to(&self, config: &mut AppConfig) {
        if let Some(db_path) = &self.db_path {
            config.db_path = db_path.clone();
        }
        if let Some(catalog) = &self.catalog {
            config.catalog_path = catalog.clone();
        }
        if let Some(top_k) = self.top_k {
            config.top_k = top_k;
        }
        if let Some(model) = &self.chat_model {
            config.chat_model = model.clone();
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if self.record_history {
            config.record_history = true;
        }
        if let Some(cache_dir) = &self.cache_dir {
            config.model_cache_dir = Some(cache_dir.clone());
        }
    }
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

/// Open the index and build the embedding provider recorded in it
async fn create_retriever(
    config: &AppConfig,
) -> Result<BruteForceRetriever<DynamicEmbeddingProvider, SqliteStorage>> {
    if !config.db_path.exists() {
        anyhow::bail!(
            "Database file not found: {}\n\
             Please run the ingestion binary first to create the index.",
            config.db_path.display()
        );
    }

    info!("Loading index from: {}", config.db_path.display());
    let storage = SqliteStorage::open(config.db_path.to_string_lossy().into_owned())
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;

    let stored = storage
        .get_config()
        .await
        .context("Failed to retrieve embedding configuration from database")?
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Database has no embedding configuration.\n\
                 Please run the ingestion binary with --mode init-new first."
            )
        })?;

    info!(
        "Using embedding model: {} (dimension: {})",
        stored.model_name, stored.dimension
    );

    let chunk_count = storage
        .count_chunks()
        .await
        .context("Failed to count chunks in database")?;
    if chunk_count == 0 {
        anyhow::bail!(
            "Index is empty (0 chunks found).\n\
             Please run the ingestion binary to index the catalog first."
        );
    }
    info!("Index contains {} chunks", chunk_count);

    let provider = DynamicEmbeddingProvider::for_stored_config(
        &stored,
        config::api_key(),
        &config.openai_base_url,
        Some(config.cache_dir()),
    )
    .context("Failed to initialize embedding provider")?;

    Ok(BruteForceRetriever::new(provider, storage))
}

/// Build the question answerer from the index and the chat model
async fn create_answerer(config: &AppConfig) -> Result<Answerer> {
    let api_key = config::api_key().ok_or_else(|| {
        anyhow::anyhow!(
            "{} environment variable required for answer generation.\n\
             Set it with: export {}=your-api-key",
            config::API_KEY_ENV,
            config::API_KEY_ENV
        )
    })?;

    let retriever = create_retriever(config).await?;
    let chat = OpenAIChat::new(api_key, config.chat_settings()).context("Failed to create chat client")?;
    info!("Chat model: {}", config.chat_model);

    Ok(RetrievalQa::new(retriever, chat, config.top_k))
}

/// Answerer that opens the index and the chat client on the first question.
///
/// Keyword search, collections and the cart never ask a question, so they work
/// without an API key or a built index.
struct LazyAnswerer {
    config: AppConfig,
    inner: OnceCell<Answerer>,
}

impl LazyAnswerer {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            inner: OnceCell::new(),
        }
    }

    async fn get(&self) -> QueryResult<&Answerer> {
        let config = &self.config;
        self.inner
            .get_or_try_init(|| async move {
                create_answerer(config)
                    .await
                    .map_err(|e| QueryError::Unavailable(format!("{:#}", e)))
            })
            .await
    }
}

#[async_trait]
impl QuestionAnswerer for LazyAnswerer {
    async fn ask(&self, question: &str) -> QueryResult<Answer> {
        self.get().await?.ask(question).await
    }
}

/// Parse the catalog file into collections
async fn load_catalog(path: &Path) -> Result<Catalog> {
    let provider =
        TextFileCatalogProvider::new(path).with_context(|| format!("Failed to open catalog {:?}", path))?;
    let collections = provider
        .fetch_collections()
        .await
        .with_context(|| format!("Failed to read catalog {:?}", path))?;

    info!("Loaded {} collections from {}", collections.len(), provider.name());
    Ok(Catalog::new(collections))
}

/// Shorten text to at most `max` characters
fn truncate(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > max {
        let head: String = flat.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        flat
    }
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(label).add_attribute(Attribute::Bold))
        .collect()
}

fn relevance_color(relevance: &str) -> Color {
    match relevance {
        "IDENTICAL" => Color::Green,
        "HIGHLY_SIMILAR" => Color::Cyan,
        "SIMILAR" => Color::Yellow,
        _ => Color::White,
    }
}

/// Format a book list response as text and tables
fn format_response_table(response: &BookListResponse) -> String {
    let mut out = String::new();
    out.push_str(&response.summary);
    out.push_str("\n\n");
    out.push_str(response.answer.trim());
    out.push('\n');

    if !response.collections.is_empty() {
        out.push_str(&format!("\nCollections mentioned: {}\n", response.collections.join(", ")));
    }

    if !response.sources.is_empty() {
        let mut table = new_table();
        table.set_header(header(&["Rank", "Excerpt", "Relevance", "Score", "Grade match"]));
        for (idx, source) in response.sources.iter().enumerate() {
            table.add_row(vec![
                Cell::new(idx + 1),
                Cell::new(truncate(&source.content, 70)),
                Cell::new(&source.relevance).fg(relevance_color(&source.relevance)),
                Cell::new(format!("{:.4}", source.score)),
                Cell::new(if source.grade_match { "yes" } else { "" }),
            ]);
        }
        out.push_str(&format!("\nSources:\n{}\n", table));
    }

    out.push_str(&format!("\nLesson plan idea: {}", response.lesson_plan));
    if response.saved {
        out.push_str("\n(search saved to history)");
    }
    out
}

fn format_books_table(books: &[&Book]) -> String {
    if books.is_empty() {
        return "No books found.".to_string();
    }

    let mut table = new_table();
    table.set_header(header(&["Title", "Grade", "Description"]));
    for book in books {
        table.add_row(vec![
            Cell::new(&book.title),
            Cell::new(&book.grade),
            Cell::new(truncate(&book.description, 60)),
        ]);
    }
    table.to_string()
}

fn format_collections_table(catalog: &Catalog, collections: &[&Collection], grade: Option<GradeLevel>) -> String {
    if collections.is_empty() {
        return match grade {
            Some(grade) => format!("No collections listed for {}.", grade),
            None => "The catalog lists no collections.".to_string(),
        };
    }

    let mut table = new_table();
    table.set_header(header(&["Collection", "Grades", "Price", "Books"]));
    for collection in collections {
        let price = match grade {
            Some(grade) => catalog
                .price_for(&collection.name, grade)
                .unwrap_or("-")
                .to_string(),
            None => collection
                .prices
                .iter()
                .map(|p| format!("{}: {}", p.grade, p.price))
                .collect::<Vec<_>>()
                .join("\n"),
        };

        table.add_row(vec![
            Cell::new(&collection.name),
            Cell::new(collection.grades.join(", ")),
            Cell::new(price),
            Cell::new(collection.book_titles.len()),
        ]);
    }
    table.to_string()
}

fn format_cart_table(cart: &Cart) -> Result<String> {
    if cart.is_empty() {
        return Ok("Your cart is empty.".to_string());
    }

    let mut table = new_table();
    table.set_header(header(&["#", "Collection", "Grade", "Price"]));
    for (idx, item) in cart.items().iter().enumerate() {
        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(&item.collection),
            Cell::new(&item.grade),
            Cell::new(item.price),
        ]);
    }
    let total = cart.total().context("Failed to total the cart")?;
    Ok(format!("{}\nTotal: {}", table, total))
}

fn format_receipt(receipt: &Receipt) -> String {
    let mut table = new_table();
    table.set_header(header(&["Collection", "Grade", "Price"]));
    for item in &receipt.items {
        table.add_row(vec![
            Cell::new(&item.collection),
            Cell::new(&item.grade),
            Cell::new(item.price),
        ]);
    }
    format!(
        "Order {} placed at {}\n{}\nTotal: {}",
        receipt.order_id,
        receipt.placed_at.to_rfc3339(),
        table,
        receipt.total
    )
}

fn format_history_table(records: &[SearchRecord]) -> String {
    if records.is_empty() {
        return "No searches yet.".to_string();
    }

    let mut table = new_table();
    table.set_header(header(&["Grade", "Subject", "Theme", "Time"]));
    for record in records {
        table.add_row(vec![
            Cell::new(&record.grade),
            Cell::new(&record.subject),
            Cell::new(&record.theme),
            Cell::new(record.timestamp.format("%Y-%m-%d %H:%M:%S")),
        ]);
    }
    table.to_string()
}

/// Render counts as a horizontal bar chart
fn render_chart(title: &str, counts: &[(String, usize)]) -> String {
    let mut out = format!("{}\n", title);
    let Some(max) = counts.iter().map(|(_, count)| *count).max() else {
        out.push_str("  (no data)\n");
        return out;
    };

    let label_width = counts.iter().map(|(label, _)| label.chars().count()).max().unwrap_or(0);
    for (label, count) in counts {
        let width = (count * CHART_WIDTH).div_ceil(max);
        out.push_str(&format!(
            "  {:<label_width$} | {} {}\n",
            label,
            "█".repeat(width),
            count,
            label_width = label_width
        ));
    }
    out
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output to JSON")?;
    println!("{}", json);
    Ok(())
}

/// Generate a book list and print it
async fn run_generate<A: QuestionAnswerer>(
    boss: &mut BookBoss<A>,
    request: &SearchRequest,
    format: OutputFormat,
) -> Result<()> {
    debug!("Generating book list: {:?}", request);
    let start = Instant::now();
    let response = boss.generate_book_list(request).await?;

    match format {
        OutputFormat::Table => {
            println!("{}", format_response_table(&response));
            println!("\nAnswered in {:.2}s", start.elapsed().as_secs_f64());
        }
        OutputFormat::Json => print_json(&response)?,
    }
    Ok(())
}

fn run_find<A: QuestionAnswerer>(boss: &BookBoss<A>, keyword: &str, format: OutputFormat) -> Result<()> {
    let books = boss.find_books(keyword);
    match format {
        OutputFormat::Table => println!("{}", format_books_table(&books)),
        OutputFormat::Json => print_json(&books)?,
    }
    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  <theme>              - Set the theme and generate a book list");
    println!("  /grade G             - Set the grade (e.g. K, 3, \"2nd Grade\")");
    println!("  /subject S           - Set the subject");
    println!("  /theme T             - Set the theme (empty to clear)");
    println!("  /generate            - Generate a book list for the current selection");
    println!("  /find KEYWORD        - Search book descriptions");
    println!("  /collections [all]   - List collections for the current grade");
    println!("  /buy COLLECTION      - Add a collection for the current grade to the cart");
    println!("  /cart                - Show the cart");
    println!("  /remove N            - Remove cart item N");
    println!("  /checkout            - Place the order");
    println!("  /history [saved]     - Show this session's searches (or persisted ones)");
    println!("  /chart               - Chart searches by subject, grade and theme");
    println!("  /export PATH         - Export this session's searches as CSV");
    println!("  /grades, /subjects   - List the available choices");
    println!("  /format table|json   - Set the output format");
    println!("  /help                - Show this help");
    println!("  /quit, Ctrl+D        - Exit");
}

/// Current grade/subject/theme selection in the REPL
#[derive(Debug, Default)]
struct Selection {
    grade: Option<GradeLevel>,
    subject: Option<Subject>,
    theme: String,
}

impl Selection {
    fn request(&self) -> Option<SearchRequest> {
        Some(SearchRequest::new(self.grade?, self.subject?, self.theme.clone()))
    }

    fn describe(&self) -> String {
        format!(
            "Grade: {}, Subject: {}, Theme: {}",
            self.grade.map(|g| g.label()).unwrap_or("-"),
            self.subject.map(|s| s.label()).unwrap_or("-"),
            if self.theme.is_empty() { "-" } else { self.theme.as_str() }
        )
    }
}

async fn generate_for<A: QuestionAnswerer>(
    boss: &mut BookBoss<A>,
    selection: &Selection,
    format: OutputFormat,
) {
    match selection.request() {
        Some(request) => {
            if let Err(e) = run_generate(boss, &request, format).await {
                eprintln!("Search failed: {:#}", e);
            }
        }
        None => eprintln!("Choose a grade and a subject first (/grade, /subject)."),
    }
}

/// Run interactive REPL mode
async fn run_interactive<A: QuestionAnswerer>(
    boss: &mut BookBoss<A>,
    mut selection: Selection,
    mut format: OutputFormat,
) -> Result<()> {
    println!("Book Boss");
    print_help();
    println!();

    let mut rl = DefaultEditor::new().context("Failed to create readline editor")?;

    loop {
        match rl.readline("Books> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line).ok();

                if !line.starts_with('/') {
                    selection.theme = line.to_string();
                    generate_for(boss, &selection, format).await;
                    continue;
                }

                let (command, rest) = match line.split_once(char::is_whitespace) {
                    Some((command, rest)) => (command, rest.trim()),
                    None => (line, ""),
                };

                match command {
                    "/help" => print_help(),
                    "/quit" | "/exit" => break,
                    "/grade" => match rest.parse::<GradeLevel>() {
                        Ok(grade) => {
                            selection.grade = Some(grade);
                            println!("{}", selection.describe());
                        }
                        Err(e) => eprintln!("{}", e),
                    },
                    "/subject" => match rest.parse::<Subject>() {
                        Ok(subject) => {
                            selection.subject = Some(subject);
                            println!("{}", selection.describe());
                        }
                        Err(e) => eprintln!("{}. Type /subjects for the list.", e),
                    },
                    "/theme" => {
                        selection.theme = rest.to_string();
                        println!("{}", selection.describe());
                    }
                    "/generate" => generate_for(boss, &selection, format).await,
                    "/find" => {
                        if rest.is_empty() {
                            eprintln!("Usage: /find KEYWORD");
                        } else if let Err(e) = run_find(boss, rest, format) {
                            eprintln!("{:#}", e);
                        }
                    }
                    "/collections" => {
                        let grade = if rest == "all" { None } else { selection.grade };
                        println!(
                            "{}",
                            format_collections_table(boss.catalog(), &boss.collections(grade), grade)
                        );
                    }
                    "/buy" => {
                        let Some(grade) = selection.grade else {
                            eprintln!("Choose a grade first (/grade).");
                            continue;
                        };
                        if rest.is_empty() {
                            eprintln!("Usage: /buy COLLECTION");
                            continue;
                        }
                        match boss.add_to_cart(rest, grade) {
                            Ok(item) => println!("Added {} ({}) at {}", item.collection, item.grade, item.price),
                            Err(e) => eprintln!("{}", e),
                        }
                    }
                    "/cart" => match format_cart_table(boss.cart()) {
                        Ok(table) => println!("{}", table),
                        Err(e) => eprintln!("{:#}", e),
                    },
                    "/remove" => match rest.parse::<usize>() {
                        Ok(n) if n > 0 => match boss.remove_from_cart(n - 1) {
                            Ok(item) => println!("Removed {} ({})", item.collection, item.grade),
                            Err(e) => eprintln!("{}", e),
                        },
                        _ => eprintln!("Usage: /remove N (N is the cart position, starting at 1)"),
                    },
                    "/checkout" => match boss.checkout() {
                        Ok(receipt) => match format {
                            OutputFormat::Table => println!("{}", format_receipt(&receipt)),
                            OutputFormat::Json => print_json(&receipt)?,
                        },
                        Err(e) => eprintln!("{}", e),
                    },
                    "/history" => {
                        if rest == "saved" {
                            match boss.history() {
                                Some(history) => match history.recent_searches(HISTORY_LIMIT).await {
                                    Ok(records) => println!("{}", format_history_table(&records)),
                                    Err(e) => eprintln!("Failed to load history: {}", e),
                                },
                                None => eprintln!("History is not being recorded (use --record-history)."),
                            }
                        } else {
                            println!("{}", format_history_table(boss.session().entries()));
                        }
                    }
                    "/chart" => {
                        let session = boss.session();
                        println!("{}", render_chart("Searches by subject", &session.subject_counts()));
                        println!("{}", render_chart("Searches by grade", &session.grade_counts()));
                        println!("{}", render_chart("Searches by theme", &session.theme_counts()));
                    }
                    "/export" => {
                        if rest.is_empty() {
                            eprintln!("Usage: /export PATH");
                        } else {
                            match boss.export_history_csv(Path::new(rest)) {
                                Ok(()) => println!("Exported {} searches to {}", boss.session().len(), rest),
                                Err(e) => eprintln!("{}", e),
                            }
                        }
                    }
                    "/grades" => {
                        for grade in GradeLevel::ALL {
                            println!("  {}", grade);
                        }
                    }
                    "/subjects" => {
                        for subject in Subject::ALL {
                            println!("  {}", subject);
                        }
                    }
                    "/format" => match rest {
                        "table" => {
                            format = OutputFormat::Table;
                            println!("Set output format to table");
                        }
                        "json" => {
                            format = OutputFormat::Json;
                            println!("Set output format to JSON");
                        }
                        _ => eprintln!("Invalid format: must be 'table' or 'json'"),
                    },
                    _ => eprintln!("Unknown command: {}. Type /help for available commands.", command),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    setup_logging(&args.log_level);

    if !args.interactive && args.find.is_none() && args.grade.is_none() {
        anyhow::bail!(
            "Either --grade/--subject, --find or --interactive must be specified.\n\
             Use --help for usage information."
        );
    }

    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply_to(&mut config);
    config.validate().context("Invalid configuration")?;
    debug!("Resolved configuration: {:?}", config);

    let catalog = load_catalog(&config.catalog_path).await?;
    let mut boss = BookBoss::new(LazyAnswerer::new(config.clone()), catalog);
    if config.record_history {
        let history = SqliteStorage::open(config.db_path.to_string_lossy().into_owned())
            .context("Failed to open search history")?;
        boss = boss.with_history(Box::new(history));
        info!("Recording search history in {}", config.db_path.display());
    }

    let selection = Selection {
        grade: args.grade,
        subject: args.subject,
        theme: args.theme.trim().to_string(),
    };

    if args.interactive {
        run_interactive(&mut boss, selection, args.format).await?;
    } else if let Some(keyword) = &args.find {
        run_find(&boss, keyword, args.format)?;
    } else if let Some(request) = selection.request() {
        run_generate(&mut boss, &request, args.format).await?;
    }

    Ok(())
}
