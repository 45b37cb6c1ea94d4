//! Core data models for the book finder.
//!
//! This module contains the fundamental data structures used across the application:
//! the grade and subject vocabularies offered to the user, catalog collections and
//! books, indexed catalog chunks, and retrieval results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::filters::normalize_grade;

/// Grade levels a user can search for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GradeLevel {
    Kindergarten,
    First,
    Second,
    Third,
    Fourth,
    Fifth,
}

impl GradeLevel {
    /// All grade levels in ascending order.
    pub const ALL: [GradeLevel; 6] = [
        GradeLevel::Kindergarten,
        GradeLevel::First,
        GradeLevel::Second,
        GradeLevel::Third,
        GradeLevel::Fourth,
        GradeLevel::Fifth,
    ];

    /// Label shown to the user (e.g. "3rd Grade").
    pub fn label(&self) -> &'static str {
        match self {
            GradeLevel::Kindergarten => "Kindergarten",
            GradeLevel::First => "1st Grade",
            GradeLevel::Second => "2nd Grade",
            GradeLevel::Third => "3rd Grade",
            GradeLevel::Fourth => "4th Grade",
            GradeLevel::Fifth => "5th Grade",
        }
    }

    /// Numeric grade, with kindergarten as 0.
    pub fn number(&self) -> u8 {
        match self {
            GradeLevel::Kindergarten => 0,
            GradeLevel::First => 1,
            GradeLevel::Second => 2,
            GradeLevel::Third => 3,
            GradeLevel::Fourth => 4,
            GradeLevel::Fifth => 5,
        }
    }

    /// Look up a grade level by its numeric value.
    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|g| g.number() == number)
    }
}

impl fmt::Display for GradeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for GradeLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(grade) = Self::ALL
            .iter()
            .find(|g| g.label().eq_ignore_ascii_case(trimmed))
        {
            return Ok(*grade);
        }

        normalize_grade(trimmed)
            .and_then(|number| u8::try_from(number).ok())
            .and_then(Self::from_number)
            .ok_or_else(|| {
                format!(
                    "unknown grade level '{}' (expected Kindergarten or 1st-5th Grade)",
                    trimmed
                )
            })
    }
}

/// Subjects a user can search for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Subject {
    Reading,
    Writing,
    Math,
    Science,
    SocialStudies,
    Phonics,
    Steam,
    Stem,
    Art,
    Technology,
    Health,
    DiversityAndCulturalStudies,
    SocialEmotionalLearning,
}

impl Subject {
    /// All subjects in menu order.
    pub const ALL: [Subject; 13] = [
        Subject::Reading,
        Subject::Writing,
        Subject::Math,
        Subject::Science,
        Subject::SocialStudies,
        Subject::Phonics,
        Subject::Steam,
        Subject::Stem,
        Subject::Art,
        Subject::Technology,
        Subject::Health,
        Subject::DiversityAndCulturalStudies,
        Subject::SocialEmotionalLearning,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Subject::Reading => "Reading",
            Subject::Writing => "Writing",
            Subject::Math => "Math",
            Subject::Science => "Science",
            Subject::SocialStudies => "Social Studies",
            Subject::Phonics => "Phonics",
            Subject::Steam => "STEAM",
            Subject::Stem => "STEM",
            Subject::Art => "Art",
            Subject::Technology => "Technology",
            Subject::Health => "Health",
            Subject::DiversityAndCulturalStudies => "Diversity and Cultural Studies",
            Subject::SocialEmotionalLearning => "Social-Emotional Learning",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Subject {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .iter()
            .find(|subject| subject.label().eq_ignore_ascii_case(trimmed))
            .copied()
            .ok_or_else(|| format!("unknown subject '{}'", trimmed))
    }
}

/// A grade/subject/theme search submitted by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub grade: GradeLevel,
    pub subject: Subject,
    /// Free-text theme (e.g. "Innovation"); may be empty
    pub theme: String,
}

impl SearchRequest {
    pub fn new(grade: GradeLevel, subject: Subject, theme: impl Into<String>) -> Self {
        Self {
            grade,
            subject,
            theme: theme.into().trim().to_string(),
        }
    }

    /// The natural-language question sent to the retrieval chain.
    pub fn question(&self) -> String {
        format!(
            "Find books for {} students about {} in {}.",
            self.grade, self.theme, self.subject
        )
    }

    /// A one-line lesson plan suggestion for the request.
    pub fn lesson_plan_idea(&self) -> String {
        format!(
            "Create a lesson using books about {} for {} students focusing on {} concepts.",
            self.theme, self.grade, self.subject
        )
    }

    /// Confirmation line shown after a book list is generated.
    pub fn summary(&self) -> String {
        format!(
            "Generated book list for Grade {}, Subject: {}, Theme: {}",
            self.grade, self.subject, self.theme
        )
    }
}

/// Price of a collection for one grade, exactly as written in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradePrice {
    pub grade: String,
    pub price: String,
}

/// A named bundle of books from the catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Collection {
    /// Collection name (unique within a catalog)
    pub name: String,

    /// Free-text description, if the catalog provides one
    pub description: Option<String>,

    /// Grade labels listed for this collection, in catalog order
    pub grades: Vec<String>,

    /// Per-grade prices, in catalog order
    pub prices: Vec<GradePrice>,

    /// Titles listed under "Book Titles:"
    pub book_titles: Vec<String>,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Record a grade label, ignoring repeats.
    pub fn add_grade(&mut self, grade: &str) {
        if !self.grades.iter().any(|g| g == grade) {
            self.grades.push(grade.to_string());
        }
    }

    /// Set the price for a grade, replacing any earlier price for the same label.
    pub fn set_price(&mut self, grade: &str, price: &str) {
        match self.prices.iter_mut().find(|p| p.grade == grade) {
            Some(existing) => existing.price = price.to_string(),
            None => self.prices.push(GradePrice {
                grade: grade.to_string(),
                price: price.to_string(),
            }),
        }
    }

    /// Raw price text for an exact grade label.
    pub fn price_for_label(&self, grade: &str) -> Option<&str> {
        self.prices
            .iter()
            .find(|p| p.grade.eq_ignore_ascii_case(grade.trim()))
            .map(|p| p.price.as_str())
    }
}

/// A single book offered by the keyword finder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub title: String,
    pub grade: String,
    pub description: String,
}

impl Book {
    pub fn new(
        title: impl Into<String>,
        grade: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            grade: grade.into(),
            description: description.into(),
        }
    }
}

/// A piece of catalog text stored in the retrieval index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier (database primary key)
    pub id: Option<i64>,

    /// Chunk text as it appears in the catalog
    pub content: String,

    /// Where the chunk came from (usually the catalog file path)
    pub source: String,

    /// Position of the chunk within its source
    pub position: usize,

    /// Vector embedding of the chunk text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    pub fn new(content: impl Into<String>, source: impl Into<String>, position: usize) -> Self {
        Self {
            id: None,
            content: content.into(),
            source: source.into(),
            position,
            embedding: None,
        }
    }
}

/// Relevance classification for retrieved chunks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RelevanceLevel {
    /// Cosine similarity > 0.95
    Identical,

    /// Cosine similarity > 0.85
    HighlySimilar,

    /// Cosine similarity > 0.70
    Similar,

    /// Anything lower that still made the top-k
    Relevant,
}

impl RelevanceLevel {
    /// Determine relevance level from a cosine similarity score.
    pub fn from_score(score: f32) -> Self {
        if score > 0.95 {
            RelevanceLevel::Identical
        } else if score > 0.85 {
            RelevanceLevel::HighlySimilar
        } else if score > 0.70 {
            RelevanceLevel::Similar
        } else {
            RelevanceLevel::Relevant
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelevanceLevel::Identical => "IDENTICAL",
            RelevanceLevel::HighlySimilar => "HIGHLY_SIMILAR",
            RelevanceLevel::Similar => "SIMILAR",
            RelevanceLevel::Relevant => "RELEVANT",
        }
    }
}

/// A chunk returned by the retriever together with its score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,

    /// Cosine similarity score (higher is better)
    pub score: f32,

    pub relevance: RelevanceLevel,
}

impl RetrievedChunk {
    pub fn new(chunk: Chunk, score: f32) -> Self {
        Self {
            chunk,
            score,
            relevance: RelevanceLevel::from_score(score),
        }
    }
}

/// Configuration for the embedding model.
///
/// Stored alongside the chunk index so that query-time embeddings are produced
/// by the same model that built the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Name/identifier of the embedding model (e.g., "text-embedding-3-small")
    pub model_name: String,

    /// Dimension of the embedding vectors
    pub dimension: usize,
}
