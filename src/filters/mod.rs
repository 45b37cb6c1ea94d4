//! Grade normalization and text filters.
//!
//! Grade text shows up in many shapes ("Kindergarten", "K", "3rd Grade",
//! "Grades 3–5"). These helpers reduce it to an integer grade, with kindergarten
//! as 0, and answer whether a piece of catalog text applies to a grade.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::Book;

static FIRST_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)").expect("valid regex"));

static GRADE_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Grades?\s*(\d+)[–-](\d+)").expect("valid regex"));

static SINGLE_GRADE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Grade\s*(\d+)").expect("valid regex"));

// Range labels on catalog entries, e.g. "K-2", "Grades 3–5", "1 - 3".
static LABEL_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:grades?\s*)?(k|\d+)\s*[–-]\s*(\d+)$").expect("valid regex")
});

/// Reduce free-form grade text to a grade number.
///
/// Kindergarten (or anything starting with "k") is 0; otherwise the first run of
/// digits is used. Returns `None` when no grade can be found. Out-of-range
/// numbers such as "Grade 300" are returned as-is.
pub fn normalize_grade(grade_text: &str) -> Option<u32> {
    let grade_text = grade_text.trim().to_lowercase();

    if grade_text.contains("kindergarten") || grade_text.starts_with('k') {
        return Some(0);
    }

    FIRST_NUMBER
        .captures(&grade_text)
        .and_then(|caps| caps[1].parse::<u32>().ok())
}

/// Check whether a page of catalog text mentions the user's grade.
///
/// Ranges like "Grades 3-5" (hyphen or en dash) match inclusively; single
/// mentions like "Grade 4" must match exactly.
pub fn grade_in_page(user_grade_text: &str, page_text: &str) -> bool {
    let Some(user_grade) = normalize_grade(user_grade_text) else {
        return false;
    };

    let in_range = GRADE_RANGE.captures_iter(page_text).any(|caps| {
        match (caps[1].parse::<u32>(), caps[2].parse::<u32>()) {
            (Ok(start), Ok(end)) => start <= user_grade && user_grade <= end,
            _ => false,
        }
    });
    if in_range {
        return true;
    }

    SINGLE_GRADE
        .captures_iter(page_text)
        .any(|caps| caps[1].parse::<u32>().map_or(false, |g| g == user_grade))
}

/// Check whether a catalog grade label covers a grade number.
///
/// Handles single labels ("Grade 1", "Kindergarten") and ranges ("K-2",
/// "Grades 3–5"). Labels that normalize to nothing, such as "PreK", never match.
pub fn grade_label_matches(label: &str, grade: u8) -> bool {
    let label = label.trim();
    let grade = u32::from(grade);

    if let Some(caps) = LABEL_RANGE.captures(label) {
        let start = if caps[1].eq_ignore_ascii_case("k") {
            Some(0)
        } else {
            caps[1].parse::<u32>().ok()
        };
        if let (Some(start), Ok(end)) = (start, caps[2].parse::<u32>()) {
            return start <= grade && grade <= end;
        }
    }

    normalize_grade(label) == Some(grade)
}

/// Case-insensitive keyword search over book descriptions.
///
/// A blank keyword performs no search and yields no results.
pub fn keyword_search<'a>(books: &'a [Book], keyword: &str) -> Vec<&'a Book> {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return Vec::new();
    }

    books
        .iter()
        .filter(|book| book.description.to_lowercase().contains(&keyword))
        .collect()
}
