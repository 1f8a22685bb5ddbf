use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diagnostics::ClassificationError;

/// Controlled language vocabulary. Unknown stored values read back as `Other`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LanguageCode {
    Farsi,
    Arabic,
    Somali,
    French,
    English,
    German,
    Greek,
    Amharic,
    #[serde(other)]
    Other,
}

impl LanguageCode {
    pub const ALL: [LanguageCode; 9] = [
        LanguageCode::Farsi,
        LanguageCode::Arabic,
        LanguageCode::Somali,
        LanguageCode::French,
        LanguageCode::English,
        LanguageCode::German,
        LanguageCode::Greek,
        LanguageCode::Amharic,
        LanguageCode::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LanguageCode::Farsi => "Farsi",
            LanguageCode::Arabic => "Arabic",
            LanguageCode::Somali => "Somali",
            LanguageCode::French => "French",
            LanguageCode::English => "English",
            LanguageCode::German => "German",
            LanguageCode::Greek => "Greek",
            LanguageCode::Amharic => "Amharic",
            LanguageCode::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AudienceCode {
    Kids,
    /// Also what an unknown stored value reads back as, matching the
    /// resolver's fallback.
    #[serde(other)]
    Adults,
}

impl AudienceCode {
    pub const ALL: [AudienceCode; 2] = [AudienceCode::Adults, AudienceCode::Kids];

    pub fn as_str(self) -> &'static str {
        match self {
            AudienceCode::Adults => "Adults",
            AudienceCode::Kids => "Kids",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TopicCode {
    Fiction,
    #[serde(rename = "Non fiction")]
    NonFiction,
    #[serde(rename = "Educational/sciences")]
    EducationalSciences,
    Languages,
    #[serde(other)]
    Other,
}

impl TopicCode {
    pub const ALL: [TopicCode; 5] = [
        TopicCode::Fiction,
        TopicCode::NonFiction,
        TopicCode::EducationalSciences,
        TopicCode::Languages,
        TopicCode::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TopicCode::Fiction => "Fiction",
            TopicCode::NonFiction => "Non fiction",
            TopicCode::EducationalSciences => "Educational/sciences",
            TopicCode::Languages => "Languages",
            TopicCode::Other => "Other",
        }
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for AudienceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TopicCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four transaction status labels the report knows about.
pub const STATUS_CHECKED_OUT: &str = "Checked out";
pub const STATUS_RETURNED: &str = "Returned";
pub const STATUS_RENEWED: &str = "Renewed";
pub const STATUS_NEW_PATRON: &str = "New patron";

pub const KNOWN_STATUSES: [&str; 4] = [
    STATUS_CHECKED_OUT,
    STATUS_RETURNED,
    STATUS_RENEWED,
    STATUS_NEW_PATRON,
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedBook {
    pub id: String,
    pub title: String,
    pub language: LanguageCode,
    pub audience: AudienceCode,
    pub topic: TopicCode,
    #[serde(default)]
    pub errors: Vec<ClassificationError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedTransaction {
    pub book_id: String,
    pub status: String,
    pub entry_date: NaiveDateTime,
}

/// A transaction row as persisted, with its auto-increment key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredTransaction {
    pub id: u64,
    #[serde(flatten)]
    pub transaction: NormalizedTransaction,
}

/// Importable tables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Table {
    Book,
    Transaction,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Book => "Book",
            Table::Transaction => "Transaction",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportMetadata {
    pub id: Table,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableInfo {
    pub count: usize,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One row of the Transaction ⋈ Book join used by the report.
///
/// Book's `id` and `errors` are surfaced as `book_id` and `book_errors` so they
/// do not collide with the transaction's own columns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportRow {
    pub transaction_id: u64,
    pub book_id: String,
    pub status: String,
    pub entry_date: NaiveDateTime,
    pub title: String,
    pub language: LanguageCode,
    pub audience: AudienceCode,
    pub topic: TopicCode,
    pub book_errors: Vec<ClassificationError>,
}

impl ReportRow {
    pub fn join(stored: &StoredTransaction, book: &NormalizedBook) -> Self {
        Self {
            transaction_id: stored.id,
            book_id: book.id.clone(),
            status: stored.transaction.status.clone(),
            entry_date: stored.transaction.entry_date,
            title: book.title.clone(),
            language: book.language,
            audience: book.audience,
            topic: book.topic,
            book_errors: book.errors.clone(),
        }
    }
}
