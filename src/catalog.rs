use std::collections::HashSet;
use std::path::Path;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::cli::{ImportBooksArgs, ImportMetadataArgs};
use crate::diagnostics::{
    BatchImportError, ClassificationError, EntryErrors, ImportDiagnostic, Level, abort_on_error,
    continue_on_diagnostic,
};
use crate::model::{ImportMetadata, NormalizedBook, Table};
use crate::store::{LocalFsStore, Store};
use crate::taxonomy::Taxonomy;

pub async fn run(args: ImportBooksArgs) -> anyhow::Result<()> {
    let input = std::fs::read_to_string(&args.file)
        .with_context(|| format!("read catalog: {}", args.file))?;
    let params = ImportParams::for_file(Path::new(&args.file), &args.metadata)?;
    let policy: fn(ImportDiagnostic<'_>) -> bool = if args.strict {
        abort_on_error
    } else {
        continue_on_diagnostic
    };

    let store = LocalFsStore::open(&args.store.data_dir)
        .await
        .context("open store")?;
    let result = import_books(&store, &input, &params, |diagnostic| {
        if let ImportDiagnostic::Batch(batch) = diagnostic {
            log_batch_error(batch);
        }
        policy(diagnostic)
    })
    .await;
    store.close().await.context("close store")?;
    result?;

    Ok(())
}

fn log_batch_error(batch: &BatchImportError) {
    let entries = batch.errors.len();
    let diagnostics = batch.diagnostic_count();
    match batch.level {
        Level::Error => tracing::error!(
            entries,
            diagnostics,
            "catalog has classification errors; run `books --errors-only` to inspect"
        ),
        Level::Warning => tracing::warn!(
            entries,
            diagnostics,
            "catalog has classification warnings; run `books --errors-only` to inspect"
        ),
    }
}

/// Tags marking catalog items that are not books.
const NON_BOOK_TAGS: [&str; 2] = ["Board game", "Cards"];

/// One raw catalog entry as exported by the library system.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "books_id", deserialize_with = "string_or_number")]
    book_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    language: Option<Vec<String>>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CatalogEntry {
    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    /// First element of `language`, when present and non-blank.
    pub fn declared_language(&self) -> Option<&str> {
        self.language
            .as_ref()
            .and_then(|l| l.first())
            .map(String::as_str)
            .filter(|l| !l.trim().is_empty())
    }

    pub fn tags(&self) -> &[String] {
        self.tags.as_deref().unwrap_or_default()
    }

    pub fn is_book(&self) -> bool {
        !self.tags().iter().any(|tag| {
            NON_BOOK_TAGS
                .iter()
                .any(|non_book| tag.trim().eq_ignore_ascii_case(non_book))
        })
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

/// Parses a catalog export: either a JSON array of entries or a JSON object
/// whose values are entries.
pub fn parse_catalog(input: &str) -> anyhow::Result<Vec<CatalogEntry>> {
    let value: serde_json::Value = serde_json::from_str(input).context("parse catalog json")?;
    let raw_entries = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        other => anyhow::bail!(
            "catalog must be a JSON array or object, got {}",
            json_kind(&other)
        ),
    };

    raw_entries
        .into_iter()
        .enumerate()
        .map(|(idx, raw)| {
            serde_json::from_value(raw).with_context(|| format!("parse catalog entry #{idx}"))
        })
        .collect()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Result of classifying a whole catalog.
#[derive(Debug, Clone)]
pub struct NormalizedCatalog {
    pub books: Vec<NormalizedBook>,
    pub skipped_non_books: usize,
    pub batch_error: Option<BatchImportError>,
}

/// Classifies every book entry.
///
/// Each diagnostic is handed to `on_diagnostic` right after its entry is
/// classified; returning `false` aborts with that diagnostic as the error.
/// The batch diagnostic, if any, is reported last and is informational.
pub fn normalize_books<F>(
    taxonomy: &Taxonomy,
    entries: &[CatalogEntry],
    mut on_diagnostic: F,
) -> anyhow::Result<NormalizedCatalog>
where
    F: FnMut(ImportDiagnostic<'_>) -> bool,
{
    let mut books = Vec::with_capacity(entries.len());
    let mut skipped_non_books = 0;

    let mut seen_ids = HashSet::new();
    for entry in entries {
        if !entry.is_book() {
            skipped_non_books += 1;
            tracing::debug!(book_id = entry.book_id(), "skipping non-book catalog entry");
            continue;
        }
        if !seen_ids.insert(entry.book_id()) {
            anyhow::bail!("duplicate book id in catalog: {}", entry.book_id());
        }

        let (book, errors) = classify_entry(taxonomy, entry);
        for err in &errors {
            tracing::debug!(
                book_id = %book.id,
                level = %err.level,
                message = %err.message,
                "classification diagnostic"
            );
            if !on_diagnostic(ImportDiagnostic::Entry(err)) {
                return Err(ImportDiagnostic::Entry(err).into_error())
                    .with_context(|| format!("classify catalog entry {}", book.id));
            }
        }
        books.push(NormalizedBook { errors, ..book });
    }

    let batch_error = BatchImportError::collect(
        books
            .iter()
            .map(|b| EntryErrors {
                book_id: b.id.clone(),
                title: b.title.clone(),
                errors: b.errors.clone(),
            })
            .collect(),
    );
    if let Some(batch) = &batch_error {
        // Informational only: the import goes ahead whatever the callback says.
        let _ = on_diagnostic(ImportDiagnostic::Batch(batch));
    }

    Ok(NormalizedCatalog {
        books,
        skipped_non_books,
        batch_error,
    })
}

/// Runs the three resolvers on one entry and returns the row together with the
/// diagnostics raised for it.
pub fn classify_entry(
    taxonomy: &Taxonomy,
    entry: &CatalogEntry,
) -> (NormalizedBook, Vec<ClassificationError>) {
    let mut errors = Vec::new();
    let language = taxonomy.resolve_language(entry, &mut errors);
    let audience = taxonomy.resolve_audience(entry, &mut errors);
    let topic = taxonomy.resolve_topic(entry, &mut errors);

    let book = NormalizedBook {
        id: entry.book_id().to_owned(),
        title: entry.title().to_owned(),
        language,
        audience,
        topic,
        errors: Vec::new(),
    };
    (book, errors)
}

#[derive(Debug, Clone, Default)]
pub struct ImportParams {
    pub last_modified: Option<DateTime<Utc>>,
}

impl ImportParams {
    /// Explicit timestamp, else the file's modification time, unless disabled.
    pub fn for_file(path: &Path, metadata: &ImportMetadataArgs) -> anyhow::Result<Self> {
        if metadata.no_metadata {
            return Ok(Self::default());
        }
        if let Some(last_modified) = metadata.last_modified {
            return Ok(Self {
                last_modified: Some(last_modified),
            });
        }

        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .with_context(|| format!("read modification time: {}", path.display()))?;
        Ok(Self {
            last_modified: Some(DateTime::<Utc>::from(modified)),
        })
    }
}

/// Parses, classifies and stores a catalog, replacing the Book table.
pub async fn import_books<F>(
    store: &dyn Store,
    input: &str,
    params: &ImportParams,
    on_diagnostic: F,
) -> anyhow::Result<NormalizedCatalog>
where
    F: FnMut(ImportDiagnostic<'_>) -> bool,
{
    let entries = parse_catalog(input).context("parse catalog")?;
    let catalog = normalize_books(&Taxonomy::new(), &entries, on_diagnostic)?;

    store
        .remove_all(Table::Book)
        .await
        .context("remove existing books")?;
    store
        .insert_books(&catalog.books)
        .await
        .context("insert books")?;

    if let Some(last_modified) = params.last_modified {
        store
            .upsert_import(&ImportMetadata {
                id: Table::Book,
                last_modified,
            })
            .await
            .context("record book import")?;
    }

    tracing::info!(
        books = catalog.books.len(),
        skipped = catalog.skipped_non_books,
        "imported catalog"
    );
    Ok(catalog)
}
