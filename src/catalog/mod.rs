//! Catalog parsing.
//!
//! The catalog is a flat text file of collection blocks:
//!
//! ```text
//! Collection: Optimistic Library
//! Description: Picture books about hope and perseverance.
//! Grade: Kindergarten
//! Your Price: $250.00
//! Grade: Grade 1
//! Your Price: $270.00
//! Book Titles:
//! - The Little Engine That Could
//! - After the Fall
//! ---
//! ```
//!
//! [`parse_book_entries`] turns that text into [`Collection`]s, and [`Catalog`]
//! answers the lookups the rest of the application needs.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::filters::grade_label_matches;
use crate::models::{Book, Collection, GradeLevel};

const COLLECTION_PREFIX: &str = "Collection:";
const GRADE_PREFIX: &str = "Grade:";
const DESCRIPTION_PREFIX: &str = "Description:";
const PRICE_PREFIX: &str = "Your Price:";
const TITLES_PREFIX: &str = "Book Titles:";
const BLOCK_END: &str = "---";

// "1. Title", "2) Title"
static LIST_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+[.)]\s*").expect("valid regex"));

/// Parse catalog text into collections.
///
/// Collections keep the order in which their names first appear. A name that
/// shows up again merges into the earlier entry rather than creating a new one.
/// Lines under a `Collection:` with no name are ignored.
pub fn parse_book_entries(text: &str) -> Vec<Collection> {
    let mut collections: Vec<Collection> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    let mut current: Option<usize> = None;
    let mut current_grade: Option<String> = None;
    let mut in_titles = false;

    for raw in text.lines() {
        let line = raw.trim();

        if let Some(rest) = line.strip_prefix(COLLECTION_PREFIX) {
            let name = rest.trim().to_string();
            current_grade = None;
            in_titles = false;

            // An unnamed block is skipped up to the next named collection.
            if name.is_empty() {
                current = None;
                continue;
            }

            let position = *index.entry(name.clone()).or_insert_with(|| {
                collections.push(Collection::new(name.clone()));
                collections.len() - 1
            });
            current = Some(position);
            continue;
        }

        let Some(position) = current else {
            continue;
        };
        let collection = &mut collections[position];

        if in_titles {
            if line == BLOCK_END {
                in_titles = false;
            } else if let Some(title) = clean_title(line) {
                collection.book_titles.push(title);
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix(GRADE_PREFIX) {
            let grade = rest.trim();
            if grade.is_empty() {
                current_grade = None;
            } else {
                collection.add_grade(grade);
                current_grade = Some(grade.to_string());
            }
        } else if let Some(rest) = line.strip_prefix(DESCRIPTION_PREFIX) {
            let description = rest.trim();
            if !description.is_empty() {
                collection.description = Some(description.to_string());
            }
        } else if let Some(rest) = line.strip_prefix(PRICE_PREFIX) {
            // A price only counts when it follows a grade; it then waits for the next one.
            if let Some(grade) = current_grade.take() {
                collection.set_price(&grade, rest.trim());
            }
        } else if let Some(rest) = line.strip_prefix(TITLES_PREFIX) {
            in_titles = true;
            if let Some(title) = clean_title(rest) {
                collection.book_titles.push(title);
            }
        }
    }

    debug!("Parsed {} collections from catalog", collections.len());
    collections
}

/// Strip bullets and list numbering from a title line.
fn clean_title(line: &str) -> Option<String> {
    let line = line
        .trim()
        .trim_start_matches(|c: char| c == '-' || c == '*' || c == '•')
        .trim();
    let line = LIST_NUMBER.replace(line, "");
    let line = line.trim();

    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

/// Parsed catalog with lookup helpers.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    collections: Vec<Collection>,
}

impl Catalog {
    pub fn new(collections: Vec<Collection>) -> Self {
        Self { collections }
    }

    /// Parse catalog text.
    pub fn parse(text: &str) -> Self {
        Self::new(parse_book_entries(text))
    }

    pub fn collections(&self) -> &[Collection] {
        &self.collections
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Find a collection by name, ignoring case and surrounding whitespace.
    pub fn get(&self, name: &str) -> Option<&Collection> {
        let name = name.trim();
        self.collections
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Collections that list the grade, either as a grade line or a priced grade.
    pub fn collections_for_grade(&self, grade: GradeLevel) -> Vec<&Collection> {
        self.collections
            .iter()
            .filter(|c| {
                c.grades
                    .iter()
                    .chain(c.prices.iter().map(|p| &p.grade))
                    .any(|label| grade_label_matches(label, grade.number()))
            })
            .collect()
    }

    /// Raw price text for a collection at a grade level.
    pub fn price_for(&self, collection: &str, grade: GradeLevel) -> Option<&str> {
        self.get(collection)?
            .prices
            .iter()
            .find(|p| grade_label_matches(&p.grade, grade.number()))
            .map(|p| p.price.as_str())
    }

    /// Flatten every listed title into a [`Book`].
    ///
    /// A book inherits its collection's grade labels and description (or the
    /// collection name when there is no description).
    pub fn books(&self) -> Vec<Book> {
        self.collections
            .iter()
            .flat_map(|collection| {
                let grade = collection.grades.join(", ");
                let description = collection
                    .description
                    .clone()
                    .unwrap_or_else(|| collection.name.clone());
                collection
                    .book_titles
                    .iter()
                    .map(move |title| Book::new(title.clone(), grade.clone(), description.clone()))
            })
            .collect()
    }
}

/// Built-in book list used by the keyword finder when no catalog titles are available.
pub fn default_books() -> Vec<Book> {
    vec![Book::new(
        "Sample Book",
        "5",
        "A sample book about innovation and creativity.",
    )]
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Intro text before any collection is ignored.
Your Price: $1.00

Collection: Culturally Responsive Collections — Multicultural Edition
Grade: PreK
Your Price: $275.00
Grade: Kindergarten
Your Price: $275.00
Grade: Grade 1
Your Price: $275.00

Collection: Optimistic Library
Description: Stories of hope, grit, and innovation.
Grade: Kindergarten
Your Price: $250.00
Grade: Grade 1
Your Price: $270.00
Book Titles:
- The Most Magnificent Thing
* Rosie Revere, Engineer
1. After the Fall
• The Dot
2) Brave Irene
---
Grade: Grade 2
Your Price: $270.00

Collection: STEM Starters
Grade: Grades 3–5
Description: Hands-on science and engineering reads.
Book Titles: Ada Twist, Scientist
Iggy Peck, Architect
";

    #[test]
    fn test_parse_collections_in_order() {
        let collections = parse_book_entries(SAMPLE);
        let names: Vec<&str> = collections.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Culturally Responsive Collections — Multicultural Edition",
                "Optimistic Library",
                "STEM Starters",
            ]
        );
    }

    #[test]
    fn test_parse_prices_per_grade() {
        let collections = parse_book_entries(SAMPLE);
        let optimistic = &collections[1];

        assert_eq!(optimistic.price_for_label("Kindergarten"), Some("$250.00"));
        assert_eq!(optimistic.price_for_label("Grade 1"), Some("$270.00"));
        assert_eq!(optimistic.price_for_label("Grade 2"), Some("$270.00"));
        assert_eq!(collections[0].prices.len(), 3);
        assert_eq!(collections[0].price_for_label("PreK"), Some("$275.00"));
    }

    #[test]
    fn test_parse_description_and_titles() {
        let collections = parse_book_entries(SAMPLE);
        let optimistic = &collections[1];

        assert_eq!(
            optimistic.description.as_deref(),
            Some("Stories of hope, grit, and innovation.")
        );
        assert_eq!(
            optimistic.book_titles,
            vec![
                "The Most Magnificent Thing".to_string(),
                "Rosie Revere, Engineer".to_string(),
                "After the Fall".to_string(),
                "The Dot".to_string(),
                "Brave Irene".to_string(),
            ]
        );

        // Title block runs to the end of the file when there is no terminator
        let stem = &collections[2];
        assert_eq!(
            stem.book_titles,
            vec!["Ada Twist, Scientist".to_string(), "Iggy Peck, Architect".to_string()]
        );
        assert!(stem.prices.is_empty());
    }

    #[test]
    fn test_price_without_grade_is_ignored() {
        let text = "Collection: A\nYour Price: $10.00\nGrade: Grade 1\nYour Price: $20.00\nYour Price: $30.00\n";
        let collections = parse_book_entries(text);
        assert_eq!(collections[0].prices.len(), 1);
        assert_eq!(collections[0].price_for_label("Grade 1"), Some("$20.00"));
    }

    #[test]
    fn test_blank_grade_drops_following_price() {
        let text = "Collection: A\nGrade: Grade 1\nGrade:\nYour Price: $99.00\n";
        let collections = parse_book_entries(text);
        assert!(collections[0].prices.is_empty());
        assert_eq!(collections[0].grades, vec!["Grade 1".to_string()]);
    }

    #[test]
    fn test_unnamed_collection_is_skipped() {
        let text = "Collection:\nGrade: Grade 1\nYour Price: $10.00\n\nCollection: B\nGrade: Grade 2\nYour Price: $20.00\n";
        let collections = parse_book_entries(text);
        assert_eq!(collections.len(), 1);
        assert_eq!(collections[0].name, "B");
        assert_eq!(collections[0].price_for_label("Grade 1"), None);
        assert_eq!(collections[0].price_for_label("Grade 2"), Some("$20.00"));
    }

    #[test]
    fn test_repeated_collection_merges() {
        let text = "Collection: A\nGrade: Grade 1\nYour Price: $20.00\n\nCollection: B\n\nCollection: A\nGrade: Grade 2\nYour Price: $25.00\n";
        let collections = parse_book_entries(text);
        assert_eq!(collections.len(), 2);
        assert_eq!(collections[0].prices.len(), 2);
        assert_eq!(collections[0].grades, vec!["Grade 1".to_string(), "Grade 2".to_string()]);
    }

    #[test]
    fn test_collection_line_ends_title_block() {
        let text = "Collection: A\nBook Titles:\nFirst\nCollection: B\nGrade: Grade 3\n";
        let collections = parse_book_entries(text);
        assert_eq!(collections[0].book_titles, vec!["First".to_string()]);
        assert_eq!(collections[1].grades, vec!["Grade 3".to_string()]);
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_book_entries("").is_empty());
        assert!(Catalog::parse("no collections here").is_empty());
    }

    #[test]
    fn test_catalog_lookups() {
        let catalog = Catalog::parse(SAMPLE);

        assert!(catalog.get("optimistic library").is_some());
        assert_eq!(
            catalog.price_for("Optimistic Library", GradeLevel::First),
            Some("$270.00")
        );
        assert_eq!(catalog.price_for("Optimistic Library", GradeLevel::Fifth), None);
        assert_eq!(catalog.price_for("Missing", GradeLevel::First), None);

        let fourth: Vec<&str> = catalog
            .collections_for_grade(GradeLevel::Fourth)
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(fourth, vec!["STEM Starters"]);

        let kindergarten = catalog.collections_for_grade(GradeLevel::Kindergarten);
        assert_eq!(kindergarten.len(), 2);
    }

    #[test]
    fn test_catalog_books() {
        let catalog = Catalog::parse(SAMPLE);
        let books = catalog.books();

        assert_eq!(books.len(), 7);
        assert_eq!(books[0].title, "The Most Magnificent Thing");
        assert_eq!(books[0].grade, "Kindergarten, Grade 1, Grade 2");
        assert_eq!(books[5].description, "Hands-on science and engineering reads.");
    }
}
