use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::sync::Mutex;

use crate::model::{
    ImportMetadata, NormalizedBook, NormalizedTransaction, ReportRow, StoredTransaction, Table,
    TableInfo,
};
use crate::report::ReportQuery;

/// Persistence for the Book, Transaction and Import tables.
///
/// Callers replace a table by awaiting `remove_all` before inserting the new
/// rows.
#[async_trait]
pub trait Store: Send + Sync {
    async fn remove_all(&self, table: Table) -> anyhow::Result<()>;
    async fn insert_books(&self, books: &[NormalizedBook]) -> anyhow::Result<()>;
    async fn insert_transactions(
        &self,
        transactions: &[NormalizedTransaction],
    ) -> anyhow::Result<()>;
    async fn upsert_import(&self, meta: &ImportMetadata) -> anyhow::Result<()>;
    async fn get_import(&self, table: Table) -> anyhow::Result<Option<ImportMetadata>>;
    async fn count(&self, table: Table) -> anyhow::Result<usize>;
    async fn select_books(&self) -> anyhow::Result<Vec<NormalizedBook>>;

    /// Transaction ⋈ Book on `Book.id = Transaction.bookId`, entry date within
    /// the query's inclusive day range, ascending by entry date.
    async fn select_report_rows(&self, query: &ReportQuery) -> anyhow::Result<Vec<ReportRow>>;

    async fn close(&self) -> anyhow::Result<()>;
}

/// Row count plus last import time, or `None` when the table is empty.
pub async fn existing_info(store: &dyn Store, table: Table) -> anyhow::Result<Option<TableInfo>> {
    let count = store
        .count(table)
        .await
        .with_context(|| format!("count {table}"))?;
    if count == 0 {
        return Ok(None);
    }

    let last_import = store
        .get_import(table)
        .await
        .with_context(|| format!("get {table} import"))?;
    Ok(Some(TableInfo {
        count,
        last_modified: last_import.map(|m| m.last_modified),
    }))
}

#[derive(Debug, Default, Clone)]
struct Tables {
    books: Vec<NormalizedBook>,
    transactions: Vec<StoredTransaction>,
    imports: Vec<ImportMetadata>,
    next_transaction_id: u64,
}

impl Tables {
    fn remove_all(&mut self, table: Table) {
        match table {
            Table::Book => self.books.clear(),
            Table::Transaction => self.transactions.clear(),
        }
    }

    /// All-or-nothing: the batch is checked against itself and the table
    /// before any row is added.
    fn insert_books(&mut self, books: &[NormalizedBook]) -> anyhow::Result<()> {
        let mut ids = self.books.iter().map(|b| b.id.as_str()).collect::<HashSet<_>>();
        for book in books {
            if !ids.insert(book.id.as_str()) {
                anyhow::bail!("duplicate book id: {}", book.id);
            }
        }
        self.books.extend_from_slice(books);
        Ok(())
    }

    fn insert_transactions(&mut self, transactions: &[NormalizedTransaction]) {
        for transaction in transactions {
            self.next_transaction_id += 1;
            self.transactions.push(StoredTransaction {
                id: self.next_transaction_id,
                transaction: transaction.clone(),
            });
        }
    }

    fn upsert_import(&mut self, meta: &ImportMetadata) {
        match self.imports.iter_mut().find(|m| m.id == meta.id) {
            Some(existing) => *existing = meta.clone(),
            None => self.imports.push(meta.clone()),
        }
    }

    fn get_import(&self, table: Table) -> Option<ImportMetadata> {
        self.imports.iter().find(|m| m.id == table).cloned()
    }

    fn count(&self, table: Table) -> usize {
        match table {
            Table::Book => self.books.len(),
            Table::Transaction => self.transactions.len(),
        }
    }

    fn select_report_rows(&self, query: &ReportQuery) -> Vec<ReportRow> {
        let books = self
            .books
            .iter()
            .map(|b| (b.id.as_str(), b))
            .collect::<HashMap<_, _>>();
        let mut rows = self
            .transactions
            .iter()
            .filter(|t| query.contains(t.transaction.entry_date))
            .filter_map(|t| {
                books
                    .get(t.transaction.book_id.as_str())
                    .map(|book| ReportRow::join(t, book))
            })
            .collect::<Vec<_>>();
        // Stable sort keeps insertion order for equal timestamps.
        rows.sort_by_key(|r| r.entry_date);
        rows
    }
}

/// In-process store; contents live as long as the value.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn remove_all(&self, table: Table) -> anyhow::Result<()> {
        self.tables.lock().await.remove_all(table);
        Ok(())
    }

    async fn insert_books(&self, books: &[NormalizedBook]) -> anyhow::Result<()> {
        self.tables.lock().await.insert_books(books)
    }

    async fn insert_transactions(
        &self,
        transactions: &[NormalizedTransaction],
    ) -> anyhow::Result<()> {
        self.tables.lock().await.insert_transactions(transactions);
        Ok(())
    }

    async fn upsert_import(&self, meta: &ImportMetadata) -> anyhow::Result<()> {
        self.tables.lock().await.upsert_import(meta);
        Ok(())
    }

    async fn get_import(&self, table: Table) -> anyhow::Result<Option<ImportMetadata>> {
        Ok(self.tables.lock().await.get_import(table))
    }

    async fn count(&self, table: Table) -> anyhow::Result<usize> {
        Ok(self.tables.lock().await.count(table))
    }

    async fn select_books(&self) -> anyhow::Result<Vec<NormalizedBook>> {
        Ok(self.tables.lock().await.books.clone())
    }

    async fn select_report_rows(&self, query: &ReportQuery) -> anyhow::Result<Vec<ReportRow>> {
        Ok(self.tables.lock().await.select_report_rows(query))
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// One JSON file per table under `base_dir`.
///
/// Tables are loaded on `open` and every mutation rewrites the affected file
/// atomically, so a reader never sees a half-written table file.
#[derive(Debug)]
pub struct LocalFsStore {
    base_dir: PathBuf,
    tables: Mutex<Option<Tables>>,
}

impl LocalFsStore {
    pub async fn open(base_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)
            .await
            .with_context(|| format!("create data dir: {}", base_dir.display()))?;

        let books: Vec<NormalizedBook> = read_json(&base_dir.join(BOOK_FILE))
            .await
            .context("load book table")?
            .unwrap_or_default();
        let transactions: Vec<StoredTransaction> = read_json(&base_dir.join(TRANSACTION_FILE))
            .await
            .context("load transaction table")?
            .unwrap_or_default();
        let imports: Vec<ImportMetadata> = read_json(&base_dir.join(IMPORT_FILE))
            .await
            .context("load import table")?
            .unwrap_or_default();
        let next_transaction_id = transactions.iter().map(|t| t.id).max().unwrap_or(0);

        tracing::debug!(
            data_dir = %base_dir.display(),
            books = books.len(),
            transactions = transactions.len(),
            "opened store"
        );

        Ok(Self {
            base_dir,
            tables: Mutex::new(Some(Tables {
                books,
                transactions,
                imports,
                next_transaction_id,
            })),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn table_path(&self, table: Table) -> PathBuf {
        match table {
            Table::Book => self.base_dir.join(BOOK_FILE),
            Table::Transaction => self.base_dir.join(TRANSACTION_FILE),
        }
    }

    async fn persist(&self, tables: &Tables, table: Table) -> anyhow::Result<()> {
        let path = self.table_path(table);
        let written = match table {
            Table::Book => write_json_atomic(&path, &tables.books).await,
            Table::Transaction => write_json_atomic(&path, &tables.transactions).await,
        };
        written.with_context(|| format!("write {table} table"))
    }
}

const BOOK_FILE: &str = "book.json";
const TRANSACTION_FILE: &str = "transaction.json";
const IMPORT_FILE: &str = "import.json";

fn closed() -> anyhow::Error {
    anyhow::anyhow!("store is closed")
}

#[async_trait]
impl Store for LocalFsStore {
    async fn remove_all(&self, table: Table) -> anyhow::Result<()> {
        let mut guard = self.tables.lock().await;
        let tables = guard.as_mut().ok_or_else(closed)?;
        let mut staged = tables.clone();
        staged.remove_all(table);
        self.persist(&staged, table).await?;
        *tables = staged;
        Ok(())
    }

    async fn insert_books(&self, books: &[NormalizedBook]) -> anyhow::Result<()> {
        let mut guard = self.tables.lock().await;
        let tables = guard.as_mut().ok_or_else(closed)?;
        let mut staged = tables.clone();
        staged.insert_books(books)?;
        self.persist(&staged, Table::Book).await?;
        *tables = staged;
        Ok(())
    }

    async fn insert_transactions(
        &self,
        transactions: &[NormalizedTransaction],
    ) -> anyhow::Result<()> {
        let mut guard = self.tables.lock().await;
        let tables = guard.as_mut().ok_or_else(closed)?;
        let mut staged = tables.clone();
        staged.insert_transactions(transactions);
        self.persist(&staged, Table::Transaction).await?;
        *tables = staged;
        Ok(())
    }

    async fn upsert_import(&self, meta: &ImportMetadata) -> anyhow::Result<()> {
        let mut guard = self.tables.lock().await;
        let tables = guard.as_mut().ok_or_else(closed)?;
        let mut staged = tables.clone();
        staged.upsert_import(meta);
        write_json_atomic(&self.base_dir.join(IMPORT_FILE), &staged.imports)
            .await
            .context("write import table")?;
        *tables = staged;
        Ok(())
    }

    async fn get_import(&self, table: Table) -> anyhow::Result<Option<ImportMetadata>> {
        let guard = self.tables.lock().await;
        Ok(guard.as_ref().ok_or_else(closed)?.get_import(table))
    }

    async fn count(&self, table: Table) -> anyhow::Result<usize> {
        let guard = self.tables.lock().await;
        Ok(guard.as_ref().ok_or_else(closed)?.count(table))
    }

    async fn select_books(&self) -> anyhow::Result<Vec<NormalizedBook>> {
        let guard = self.tables.lock().await;
        Ok(guard.as_ref().ok_or_else(closed)?.books.clone())
    }

    async fn select_report_rows(&self, query: &ReportQuery) -> anyhow::Result<Vec<ReportRow>> {
        let guard = self.tables.lock().await;
        Ok(guard.as_ref().ok_or_else(closed)?.select_report_rows(query))
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.tables.lock().await.take();
        tracing::debug!(data_dir = %self.base_dir.display(), "closed store");
        Ok(())
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("read json: {}", path.display()));
        }
    };
    let value = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse json: {}", path.display()))?;
    Ok(Some(value))
}

async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
