//! Session search log.
//!
//! Every grade/subject/theme submission is appended to an in-memory log that
//! lives as long as the process. The log feeds the history table, the bar
//! charts, and CSV export.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::SearchRequest;

/// Errors from exporting the session log.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV output was not valid UTF-8")]
    Encoding,
}

pub type SessionResult<T> = Result<T, SessionError>;

/// One submitted search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub grade: String,
    pub subject: String,
    pub theme: String,
    pub timestamp: DateTime<Utc>,
}

impl SearchRecord {
    /// Record a search made now.
    pub fn new(
        grade: impl Into<String>,
        subject: impl Into<String>,
        theme: impl Into<String>,
    ) -> Self {
        Self {
            grade: grade.into(),
            subject: subject.into(),
            theme: theme.into(),
            timestamp: Utc::now(),
        }
    }
}

impl From<&SearchRequest> for SearchRecord {
    fn from(request: &SearchRequest) -> Self {
        Self::new(request.grade.label(), request.subject.label(), request.theme.clone())
    }
}

/// Append-only, process-lifetime list of searches.
#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    entries: Vec<SearchRecord>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: SearchRecord) {
        self.entries.push(record);
    }

    /// Entries in submission order.
    pub fn entries(&self) -> &[SearchRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Searches per subject, most frequent first.
    pub fn subject_counts(&self) -> Vec<(String, usize)> {
        count_by(self.entries.iter().map(|e| e.subject.as_str()))
    }

    /// Searches per grade, most frequent first.
    pub fn grade_counts(&self) -> Vec<(String, usize)> {
        count_by(self.entries.iter().map(|e| e.grade.as_str()))
    }

    /// Searches per theme, most frequent first. Blank themes are skipped.
    pub fn theme_counts(&self) -> Vec<(String, usize)> {
        count_by(
            self.entries
                .iter()
                .map(|e| e.theme.trim())
                .filter(|theme| !theme.is_empty()),
        )
    }

    /// Write the log as CSV with a `grade,subject,theme,timestamp` header.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> SessionResult<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        // An empty log still gets its header row.
        if self.entries.is_empty() {
            csv_writer.write_record(["grade", "subject", "theme", "timestamp"])?;
        }
        for entry in &self.entries {
            csv_writer.serialize(entry)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> SessionResult<String> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        String::from_utf8(buffer).map_err(|_| SessionError::Encoding)
    }

    /// Export the log to a CSV file, replacing it if it exists.
    pub fn export_csv(&self, path: &Path) -> SessionResult<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(io::BufWriter::new(file))
    }
}

fn count_by<'a>(labels: impl Iterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }

    let mut counts: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(label, count)| (label.to_string(), count))
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GradeLevel, Subject};

    fn sample_log() -> SessionLog {
        let mut log = SessionLog::new();
        log.record(SearchRecord::new("5th Grade", "Science", "Innovation"));
        log.record(SearchRecord::new("1st Grade", "Math", ""));
        log.record(SearchRecord::new("5th Grade", "Math", "Innovation"));
        log.record(SearchRecord::new("Kindergarten", "Art", "Colors"));
        log
    }

    #[test]
    fn test_record_from_request() {
        let request = SearchRequest::new(GradeLevel::Third, Subject::Steam, "Bridges");
        let record = SearchRecord::from(&request);
        assert_eq!(record.grade, "3rd Grade");
        assert_eq!(record.subject, "STEAM");
        assert_eq!(record.theme, "Bridges");
    }

    #[test]
    fn test_counts_for_charts() {
        let log = sample_log();
        assert_eq!(log.len(), 4);

        assert_eq!(
            log.subject_counts(),
            vec![
                ("Math".to_string(), 2),
                ("Art".to_string(), 1),
                ("Science".to_string(), 1),
            ]
        );
        assert_eq!(log.grade_counts()[0], ("5th Grade".to_string(), 2));
        assert_eq!(
            log.theme_counts(),
            vec![("Innovation".to_string(), 2), ("Colors".to_string(), 1)]
        );
    }

    #[test]
    fn test_csv_export() {
        let log = sample_log();
        let csv = log.to_csv_string().unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "grade,subject,theme,timestamp");
        assert!(lines[1].starts_with("5th Grade,Science,Innovation,"));
        assert!(lines[2].starts_with("1st Grade,Math,,"));
    }

    #[test]
    fn test_csv_quotes_commas() {
        let mut log = SessionLog::new();
        log.record(SearchRecord::new("2nd Grade", "Reading", "Friendship, kindness"));
        let csv = log.to_csv_string().unwrap();
        assert!(csv.contains("\"Friendship, kindness\""));
    }

    #[test]
    fn test_empty_log_has_header() {
        let log = SessionLog::new();
        assert!(log.is_empty());
        assert_eq!(log.to_csv_string().unwrap(), "grade,subject,theme,timestamp\n");
    }

    #[test]
    fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");

        sample_log().export_csv(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("grade,subject,theme,timestamp\n"));
        assert_eq!(written.lines().count(), 5);
    }
}
