use std::path::Path;

use anyhow::Context as _;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;

use crate::catalog::ImportParams;
use crate::cli::ImportTransactionsArgs;
use crate::model::{ImportMetadata, NormalizedTransaction, Table};
use crate::store::{LocalFsStore, Store};

pub async fn run(args: ImportTransactionsArgs) -> anyhow::Result<()> {
    let input = std::fs::read_to_string(&args.file)
        .with_context(|| format!("read transaction log: {}", args.file))?;
    let params = ImportParams::for_file(Path::new(&args.file), &args.metadata)?;

    let store = LocalFsStore::open(&args.store.data_dir)
        .await
        .context("open store")?;
    let result = import_transactions(&store, &input, &params).await;
    store.close().await.context("close store")?;
    result?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    #[serde(rename = "Item #")]
    item: String,
    #[serde(rename = "Item Status")]
    status: String,
    #[serde(rename = "Item Entry date")]
    entry_date: String,
}

/// Parses a header-delimited transaction log.
///
/// Only the item, status and entry date columns are read; blank lines are
/// skipped and any other column is ignored.
pub fn parse_transactions(input: &str) -> anyhow::Result<Vec<NormalizedTransaction>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input.as_bytes());
    let headers = reader
        .headers()
        .context("read transaction header row")?
        .clone();

    let mut transactions = Vec::new();
    for record in reader.records() {
        let record = record.context("read transaction row")?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        if record.iter().all(str::is_empty) {
            continue;
        }

        let raw: RawTransaction = record
            .deserialize(Some(&headers))
            .with_context(|| format!("parse transaction row at line {line}"))?;
        let entry_date = parse_entry_date(&raw.entry_date)
            .with_context(|| format!("parse entry date at line {line}"))?;

        transactions.push(NormalizedTransaction {
            book_id: raw.item,
            status: raw.status,
            entry_date,
        });
    }

    Ok(transactions)
}

const DATE_TIME_FORMATS: [&str; 12] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%d.%m.%Y %H:%M:%S%.f",
    "%d.%m.%Y %H:%M",
    "%Y-%m-%d %I:%M:%S %p",
    "%Y-%m-%d %I:%M %p",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Accepts RFC 3339 (converted to UTC) and the common spreadsheet export
/// layouts. Date-only values mean midnight.
pub fn parse_entry_date(value: &str) -> anyhow::Result<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.naive_utc());
    }
    if let Some(dt) = DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
    {
        return Ok(dt);
    }
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
    {
        return Ok(date.and_time(NaiveTime::MIN));
    }
    anyhow::bail!("unrecognized date: {value:?}")
}

/// Parses and stores a transaction log, replacing the Transaction table.
pub async fn import_transactions(
    store: &dyn Store,
    input: &str,
    params: &ImportParams,
) -> anyhow::Result<usize> {
    let transactions = parse_transactions(input).context("parse transactions")?;

    store
        .remove_all(Table::Transaction)
        .await
        .context("remove existing transactions")?;
    store
        .insert_transactions(&transactions)
        .await
        .context("insert transactions")?;

    if let Some(last_modified) = params.last_modified {
        store
            .upsert_import(&ImportMetadata {
                id: Table::Transaction,
                last_modified,
            })
            .await
            .context("record transaction import")?;
    }

    tracing::info!(transactions = transactions.len(), "imported transactions");
    Ok(transactions.len())
}
