use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Warning => f.write_str("warning"),
            Level::Error => f.write_str("error"),
        }
    }
}

/// A recoverable problem found while classifying one catalog entry.
///
/// The entry is still imported with a fallback value; the error travels with
/// the stored book so it can be inspected later.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    pub level: Level,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ClassificationError {
    pub fn new(message: impl Into<String>, level: Level, book_id: &str, title: &str) -> Self {
        Self {
            message: message.into(),
            cause: None,
            level,
            data: serde_json::json!({
                "bookId": book_id,
                "title": title,
            }),
        }
    }

    pub fn error(message: impl Into<String>, book_id: &str, title: &str) -> Self {
        Self::new(message, Level::Error, book_id, title)
    }

    pub fn warning(message: impl Into<String>, book_id: &str, title: &str) -> Self {
        Self::new(message, Level::Warning, book_id, title)
    }

    pub fn with_data(mut self, key: &str, value: serde_json::Value) -> Self {
        if let Some(obj) = self.data.as_object_mut() {
            obj.insert(key.to_owned(), value);
        }
        self
    }
}

impl fmt::Display for ClassificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.level, self.message)?;
        if let Some(book_id) = self.data.get("bookId").and_then(|v| v.as_str()) {
            write!(f, " (book {book_id})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ClassificationError {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntryErrors {
    pub book_id: String,
    pub title: String,
    pub errors: Vec<ClassificationError>,
}

/// Aggregate of every entry-level problem of one import call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchImportError {
    pub message: String,
    pub level: Level,
    pub errors: Vec<EntryErrors>,
}

impl BatchImportError {
    /// Returns `None` when no entry carries diagnostics.
    ///
    /// The batch level is `Error` as soon as one entry diagnostic is an error.
    pub fn collect(entries: Vec<EntryErrors>) -> Option<Self> {
        let entries = entries
            .into_iter()
            .filter(|e| !e.errors.is_empty())
            .collect::<Vec<_>>();
        if entries.is_empty() {
            return None;
        }

        let level = if entries
            .iter()
            .flat_map(|e| &e.errors)
            .any(|e| e.level == Level::Error)
        {
            Level::Error
        } else {
            Level::Warning
        };

        Some(Self {
            message: "Data error".to_owned(),
            level,
            errors: entries,
        })
    }

    pub fn diagnostic_count(&self) -> usize {
        self.errors.iter().map(|e| e.errors.len()).sum()
    }
}

impl fmt::Display for BatchImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({} entries, {} diagnostics)",
            self.level,
            self.message,
            self.errors.len(),
            self.diagnostic_count()
        )
    }
}

impl std::error::Error for BatchImportError {}

/// What a diagnostic callback gets to see during an import.
#[derive(Debug, Clone, Copy)]
pub enum ImportDiagnostic<'a> {
    Entry(&'a ClassificationError),
    Batch(&'a BatchImportError),
}

impl ImportDiagnostic<'_> {
    pub fn level(&self) -> Level {
        match self {
            ImportDiagnostic::Entry(err) => err.level,
            ImportDiagnostic::Batch(err) => err.level,
        }
    }

    pub fn into_error(self) -> anyhow::Error {
        match self {
            ImportDiagnostic::Entry(err) => anyhow::Error::new(err.clone()),
            ImportDiagnostic::Batch(err) => anyhow::Error::new(err.clone()),
        }
    }
}

/// Record-and-continue policy used for bulk imports.
pub fn continue_on_diagnostic(_: ImportDiagnostic<'_>) -> bool {
    true
}

/// Fail-fast policy: abort on the first error-level entry diagnostic.
pub fn abort_on_error(diagnostic: ImportDiagnostic<'_>) -> bool {
    match diagnostic {
        ImportDiagnostic::Entry(err) => err.level != Level::Error,
        ImportDiagnostic::Batch(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(book_id: &str, errors: Vec<ClassificationError>) -> EntryErrors {
        EntryErrors {
            book_id: book_id.to_owned(),
            title: format!("title {book_id}"),
            errors,
        }
    }

    #[test]
    fn batch_is_none_without_entry_errors() {
        assert!(BatchImportError::collect(vec![entry("1", vec![])]).is_none());
    }

    #[test]
    fn batch_level_escalates_to_error() {
        let batch = BatchImportError::collect(vec![
            entry("1", vec![ClassificationError::warning("w", "1", "a")]),
            entry("2", vec![]),
            entry("3", vec![ClassificationError::error("e", "3", "c")]),
        ])
        .unwrap();
        assert_eq!(batch.level, Level::Error);
        assert_eq!(batch.errors.len(), 2);
        assert_eq!(batch.diagnostic_count(), 2);
    }

    #[test]
    fn batch_level_stays_warning() {
        let batch = BatchImportError::collect(vec![entry(
            "1",
            vec![ClassificationError::warning("w", "1", "a")],
        )])
        .unwrap();
        assert_eq!(batch.level, Level::Warning);
    }

    #[test]
    fn classification_error_carries_book_context() {
        let err = ClassificationError::error("No language found", "b-7", "Some title")
            .with_data("suggested", serde_json::json!("Farsi"));
        assert_eq!(err.data["bookId"], "b-7");
        assert_eq!(err.data["title"], "Some title");
        assert_eq!(err.data["suggested"], "Farsi");
        assert_eq!(err.to_string(), "error: No language found (book b-7)");
    }

    #[test]
    fn abort_on_error_only_rejects_error_level_entries() {
        let warning = ClassificationError::warning("w", "1", "a");
        let error = ClassificationError::error("e", "1", "a");
        assert!(abort_on_error(ImportDiagnostic::Entry(&warning)));
        assert!(!abort_on_error(ImportDiagnostic::Entry(&error)));
    }
}
