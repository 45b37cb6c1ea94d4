//! Book Boss application facade.
//!
//! Ties the question answerer, the parsed catalog, the cart and the session log
//! together behind the operations a front end needs: generate a book list,
//! find books by keyword, browse and buy collections, and export history.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::cart::{Cart, CartError, CartItem, Price, Receipt};
use crate::catalog::{default_books, Catalog};
use crate::filters::{grade_in_page, keyword_search};
use crate::models::{Book, Collection, GradeLevel, RetrievedChunk, SearchRequest};
use crate::query::{QueryError, QuestionAnswerer};
use crate::session::{SearchRecord, SessionError, SessionLog};
use crate::storage::SearchHistoryStore;

/// Errors that can occur in application operations.
#[derive(Debug, Error)]
pub enum AppError {
    /// Retrieval or answer synthesis failed
    #[error("Search failed: {0}")]
    Query(#[from] QueryError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error("History export failed: {0}")]
    Session(#[from] SessionError),

    #[error("Unknown collection '{0}'")]
    UnknownCollection(String),

    #[error("Collection '{collection}' has no price for {grade}")]
    NoPrice { collection: String, grade: String },
}

/// Result type for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// One retrieved chunk as shown to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDto {
    pub content: String,
    pub source: String,
    pub position: usize,

    /// Cosine similarity score
    pub score: f32,

    /// Relevance level as a string (e.g., "IDENTICAL", "SIMILAR")
    pub relevance: String,

    /// Whether the chunk text mentions the requested grade
    pub grade_match: bool,
}

impl SourceDto {
    fn from_retrieved(retrieved: RetrievedChunk, grade: GradeLevel) -> Self {
        let grade_match = grade_in_page(grade.label(), &retrieved.chunk.content);
        Self {
            content: retrieved.chunk.content,
            source: retrieved.chunk.source,
            position: retrieved.chunk.position,
            score: retrieved.score,
            relevance: retrieved.relevance.as_str().to_string(),
            grade_match,
        }
    }
}

/// Everything the front end shows after "Generate Book List".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookListResponse {
    /// Confirmation line echoing the selections
    pub summary: String,

    /// Question sent to the answerer
    pub question: String,

    /// Synthesized answer text
    pub answer: String,

    pub sources: Vec<SourceDto>,

    /// Catalog collections named in the answer, in catalog order
    pub collections: Vec<String>,

    pub lesson_plan: String,

    /// Whether the search was written to the history store
    pub saved: bool,
}

/// Application state for one user session.
pub struct BookBoss<A: QuestionAnswerer> {
    answerer: A,
    catalog: Catalog,
    books: Vec<Book>,
    cart: Cart,
    session: SessionLog,
    history: Option<Box<dyn SearchHistoryStore>>,
}

impl<A: QuestionAnswerer> BookBoss<A> {
    /// Create a session over a parsed catalog.
    ///
    /// The keyword finder searches the catalog's titles, falling back to the
    /// built-in sample list when the catalog lists none.
    pub fn new(answerer: A, catalog: Catalog) -> Self {
        let mut books = catalog.books();
        if books.is_empty() {
            books = default_books();
        }

        Self {
            answerer,
            catalog,
            books,
            cart: Cart::new(),
            session: SessionLog::new(),
            history: None,
        }
    }

    /// Also persist every search to `history`.
    pub fn with_history(mut self, history: Box<dyn SearchHistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn books(&self) -> &[Book] {
        &self.books
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    pub fn session(&self) -> &SessionLog {
        &self.session
    }

    pub fn history(&self) -> Option<&dyn SearchHistoryStore> {
        self.history.as_deref()
    }

    /// Record the search, ask the answerer and assemble the response.
    ///
    /// The search is logged before the answerer runs, so a failed answer still
    /// shows up in history. History-store failures only clear `saved`.
    ///
    /// # Errors
    /// Returns `AppError::Query` if retrieval or the language model fails
    pub async fn generate_book_list(&mut self, request: &SearchRequest) -> AppResult<BookListResponse> {
        let record = SearchRecord::from(request);
        let saved = self.save_to_history(&record).await;
        self.session.record(record);

        let question = request.question();
        info!("{}", request.summary());
        let answer = self.answerer.ask(&question).await?;

        let collections = self.collections_mentioned(&answer.text);
        let sources = answer
            .sources
            .into_iter()
            .map(|retrieved| SourceDto::from_retrieved(retrieved, request.grade))
            .collect();

        Ok(BookListResponse {
            summary: request.summary(),
            question: answer.question,
            answer: answer.text,
            sources,
            collections,
            lesson_plan: request.lesson_plan_idea(),
            saved,
        })
    }

    async fn save_to_history(&self, record: &SearchRecord) -> bool {
        let Some(history) = self.history.as_deref() else {
            return false;
        };

        match history.save_search(record).await {
            Ok(id) => {
                info!(
                    "Search saved (#{}): Grade={}, Subject={}, Theme={}",
                    id, record.grade, record.subject, record.theme
                );
                true
            }
            Err(e) => {
                warn!("Failed to save search history: {}", e);
                false
            }
        }
    }

    fn collections_mentioned(&self, answer: &str) -> Vec<String> {
        let answer = answer.to_lowercase();
        self.catalog
            .collections()
            .iter()
            .filter(|c| !c.name.is_empty() && answer.contains(&c.name.to_lowercase()))
            .map(|c| c.name.clone())
            .collect()
    }

    /// Books whose description contains `keyword`.
    pub fn find_books(&self, keyword: &str) -> Vec<&Book> {
        keyword_search(&self.books, keyword)
    }

    /// Collections for a grade, or all of them.
    pub fn collections(&self, grade: Option<GradeLevel>) -> Vec<&Collection> {
        match grade {
            Some(grade) => self.catalog.collections_for_grade(grade),
            None => self.catalog.collections().iter().collect(),
        }
    }

    /// Put a collection into the cart at its catalog price for `grade`.
    ///
    /// # Errors
    /// Returns `AppError::UnknownCollection`, `AppError::NoPrice`, or
    /// `AppError::Cart` when the catalog price text cannot be parsed
    pub fn add_to_cart(&mut self, collection: &str, grade: GradeLevel) -> AppResult<&CartItem> {
        let entry = self
            .catalog
            .get(collection)
            .ok_or_else(|| AppError::UnknownCollection(collection.trim().to_string()))?;

        let price_text = self
            .catalog
            .price_for(&entry.name, grade)
            .ok_or_else(|| AppError::NoPrice {
                collection: entry.name.clone(),
                grade: grade.label().to_string(),
            })?;
        let price = Price::parse(price_text)?;

        let item = CartItem::new(entry.name.clone(), grade.label(), price);
        info!("Added {} ({}) to cart at {}", item.collection, item.grade, item.price);
        Ok(self.cart.add(item))
    }

    /// Remove the item at a zero-based cart position.
    pub fn remove_from_cart(&mut self, index: usize) -> AppResult<CartItem> {
        Ok(self.cart.remove(index)?)
    }

    pub fn checkout(&mut self) -> AppResult<Receipt> {
        let receipt = self.cart.checkout()?;
        info!(
            "Order {} placed: {} items, {}",
            receipt.order_id,
            receipt.items.len(),
            receipt.total
        );
        Ok(receipt)
    }

    /// Write the session log to a CSV file.
    pub fn export_history_csv(&self, path: &Path) -> AppResult<()> {
        self.session.export_csv(path)?;
        info!("Exported {} searches to {}", self.session.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, Subject};
    use crate::query::{Answer, QueryResult};
    use crate::storage::sqlite::SqliteStorage;
    use crate::storage::{StorageError, StorageResult};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    const CATALOG: &str = "\
Collection: Optimistic Library
Grade: Kindergarten
Your Price: $250.00
Grade: Grade 1
Your Price: $270.00
Description: Stories about hope, friendship and trying again.
Book Titles:
- Brave Little Bear
- The Day the Crayons Smiled
---
Collection: STEM Starters
Grade: Grades 3-5
Your Price: call for pricing
Description: Hands-on innovation and engineering reads.
Book Titles:
1. Build It!
2. Rosie Revere, Engineer
---
";

    #[derive(Default)]
    struct AnswererState {
        questions: Vec<String>,
    }

    struct MockAnswerer {
        reply: String,
        sources: Vec<RetrievedChunk>,
        should_fail: bool,
        state: Arc<Mutex<AnswererState>>,
    }

    impl MockAnswerer {
        fn new(reply: &str) -> Self {
            let mut chunk = Chunk::new("Collection: STEM Starters\nGrade: Grades 3-5", "book_entries.txt", 1);
            chunk.id = Some(2);
            let mut other = Chunk::new("Collection: Optimistic Library\nGrade: Kindergarten", "book_entries.txt", 0);
            other.id = Some(1);

            Self {
                reply: reply.to_string(),
                sources: vec![RetrievedChunk::new(chunk, 0.91), RetrievedChunk::new(other, 0.52)],
                should_fail: false,
                state: Arc::new(Mutex::new(AnswererState::default())),
            }
        }

        fn failing() -> Self {
            Self {
                should_fail: true,
                ..Self::new("")
            }
        }
    }

    #[async_trait]
    impl QuestionAnswerer for MockAnswerer {
        async fn ask(&self, question: &str) -> QueryResult<Answer> {
            self.state.lock().unwrap().questions.push(question.to_string());
            if self.should_fail {
                return Err(QueryError::CompletionError("Mock failure".to_string()));
            }
            Ok(Answer {
                question: question.to_string(),
                text: self.reply.clone(),
                sources: self.sources.clone(),
            })
        }
    }

    struct FailingHistory;

    #[async_trait]
    impl SearchHistoryStore for FailingHistory {
        async fn save_search(&self, _record: &SearchRecord) -> StorageResult<i64> {
            Err(StorageError::QueryError("disk full".to_string()))
        }

        async fn recent_searches(&self, _limit: usize) -> StorageResult<Vec<SearchRecord>> {
            Ok(Vec::new())
        }
    }

    fn app(answerer: MockAnswerer) -> BookBoss<MockAnswerer> {
        BookBoss::new(answerer, Catalog::parse(CATALOG))
    }

    #[tokio::test]
    async fn test_generate_book_list() {
        let answerer = MockAnswerer::new("Try the stem starters collection for budding engineers.");
        let state = answerer.state.clone();
        let mut boss = app(answerer);

        let request = SearchRequest::new(GradeLevel::Fourth, Subject::Science, "Innovation");
        let response = boss.generate_book_list(&request).await.unwrap();

        assert_eq!(
            response.summary,
            "Generated book list for Grade 4th Grade, Subject: Science, Theme: Innovation"
        );
        assert_eq!(
            response.question,
            "Find books for 4th Grade students about Innovation in Science."
        );
        assert_eq!(state.lock().unwrap().questions, vec![response.question.clone()]);
        assert_eq!(response.collections, vec!["STEM Starters".to_string()]);
        assert_eq!(
            response.lesson_plan,
            "Create a lesson using books about Innovation for 4th Grade students focusing on Science concepts."
        );

        assert_eq!(response.sources.len(), 2);
        assert!(response.sources[0].grade_match);
        assert_eq!(response.sources[0].relevance, "HIGHLY_SIMILAR");
        assert!(!response.sources[1].grade_match);

        assert!(!response.saved);
        assert_eq!(boss.session().len(), 1);
        assert_eq!(boss.session().entries()[0].grade, "4th Grade");
    }

    #[tokio::test]
    async fn test_failed_answer_still_logged() {
        let mut boss = app(MockAnswerer::failing());
        let request = SearchRequest::new(GradeLevel::First, Subject::Reading, "Friendship");

        let result = boss.generate_book_list(&request).await;
        assert!(matches!(result, Err(AppError::Query(_))));
        assert_eq!(boss.session().len(), 1);
    }

    #[tokio::test]
    async fn test_history_store_saves_searches() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut boss = app(MockAnswerer::new("Nothing matched.")).with_history(Box::new(storage));

        let request = SearchRequest::new(GradeLevel::Kindergarten, Subject::Art, "Colors");
        let response = boss.generate_book_list(&request).await.unwrap();
        assert!(response.saved);
        assert!(response.collections.is_empty());

        let saved = boss.history().unwrap().recent_searches(10).await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].subject, "Art");
        assert_eq!(saved[0].theme, "Colors");
    }

    #[tokio::test]
    async fn test_history_failure_not_fatal() {
        let mut boss = app(MockAnswerer::new("Optimistic Library")).with_history(Box::new(FailingHistory));

        let request = SearchRequest::new(GradeLevel::Kindergarten, Subject::Health, "Feelings");
        let response = boss.generate_book_list(&request).await.unwrap();
        assert!(!response.saved);
        assert_eq!(response.collections, vec!["Optimistic Library".to_string()]);
        assert_eq!(boss.session().len(), 1);
    }

    #[test]
    fn test_find_books_uses_catalog_titles() {
        let boss = app(MockAnswerer::new(""));

        let found: Vec<&str> = boss.find_books("ENGINEERING").iter().map(|b| b.title.as_str()).collect();
        assert_eq!(found, vec!["Build It!", "Rosie Revere, Engineer"]);
        assert!(boss.find_books("   ").is_empty());
        assert!(boss.find_books("dinosaurs").is_empty());
    }

    #[test]
    fn test_find_books_falls_back_to_sample_list() {
        let boss = BookBoss::new(MockAnswerer::new(""), Catalog::default());
        let found = boss.find_books("innovation");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Sample Book");
    }

    #[test]
    fn test_collections_by_grade() {
        let boss = app(MockAnswerer::new(""));
        assert_eq!(boss.collections(None).len(), 2);

        let names = |grade| -> Vec<String> {
            boss.collections(Some(grade)).iter().map(|c| c.name.clone()).collect()
        };
        assert_eq!(names(GradeLevel::Kindergarten), vec!["Optimistic Library"]);
        assert_eq!(names(GradeLevel::Fourth), vec!["STEM Starters"]);
        assert!(names(GradeLevel::Second).is_empty());
    }

    #[test]
    fn test_cart_flow() {
        let mut boss = app(MockAnswerer::new(""));

        boss.add_to_cart("optimistic library", GradeLevel::Kindergarten).unwrap();
        let item = boss.add_to_cart("Optimistic Library", GradeLevel::First).unwrap();
        assert_eq!(item.price.to_string(), "$270.00");
        assert_eq!(boss.cart().total().unwrap().to_string(), "$520.00");

        let removed = boss.remove_from_cart(0).unwrap();
        assert_eq!(removed.grade, "Kindergarten");

        let receipt = boss.checkout().unwrap();
        assert_eq!(receipt.total.to_string(), "$270.00");
        assert!(boss.cart().is_empty());
        assert!(matches!(boss.checkout(), Err(AppError::Cart(CartError::Empty))));
    }

    #[test]
    fn test_add_to_cart_errors() {
        let mut boss = app(MockAnswerer::new(""));

        assert!(matches!(
            boss.add_to_cart("Unknown Set", GradeLevel::First),
            Err(AppError::UnknownCollection(_))
        ));
        assert!(matches!(
            boss.add_to_cart("Optimistic Library", GradeLevel::Third),
            Err(AppError::NoPrice { .. })
        ));
        assert!(matches!(
            boss.add_to_cart("STEM Starters", GradeLevel::Fourth),
            Err(AppError::Cart(CartError::InvalidPrice(_)))
        ));
        assert!(boss.cart().is_empty());
    }

    #[tokio::test]
    async fn test_export_history_csv() {
        let mut boss = app(MockAnswerer::new("ok"));
        boss.generate_book_list(&SearchRequest::new(GradeLevel::Second, Subject::Math, "Shapes"))
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        boss.export_history_csv(&path).unwrap();

        let csv = std::fs::read_to_string(&path).unwrap();
        assert!(csv.lines().nth(1).unwrap().starts_with("2nd Grade,Math,Shapes,"));
    }
}
