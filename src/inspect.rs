use std::io::Write as _;

use anyhow::Context as _;

use crate::cli::{BooksArgs, StatusArgs};
use crate::model::{NormalizedBook, Table, TableInfo};
use crate::store::{LocalFsStore, Store, existing_info};

pub async fn status(args: StatusArgs) -> anyhow::Result<()> {
    let store = LocalFsStore::open(&args.store.data_dir)
        .await
        .context("open store")?;

    let result = status_lines(&store).await;
    store.close().await.context("close store")?;
    let lines = result?;

    let mut stdout = std::io::stdout().lock();
    for line in lines {
        writeln!(stdout, "{line}").context("write status")?;
    }
    Ok(())
}

async fn status_lines(store: &dyn Store) -> anyhow::Result<Vec<String>> {
    let mut lines = Vec::new();
    for table in [Table::Book, Table::Transaction] {
        let info = existing_info(store, table).await?;
        lines.push(status_line(table, info.as_ref()));
    }
    Ok(lines)
}

fn status_line(table: Table, info: Option<&TableInfo>) -> String {
    match info {
        None => format!("{table}: empty"),
        Some(TableInfo {
            count,
            last_modified: Some(at),
        }) => format!("{table}: {count} rows, last import {}", at.to_rfc3339()),
        Some(TableInfo {
            count,
            last_modified: None,
        }) => format!("{table}: {count} rows"),
    }
}

pub async fn books(args: BooksArgs) -> anyhow::Result<()> {
    let store = LocalFsStore::open(&args.store.data_dir)
        .await
        .context("open store")?;
    let result = store.select_books().await;
    store.close().await.context("close store")?;
    let books = result.context("select books")?;

    let mut stdout = std::io::stdout().lock();
    for book in select_listed(books, args.errors_only) {
        serde_json::to_writer(&mut stdout, &book).context("serialize book")?;
        stdout.write_all(b"\n").context("write book newline")?;
    }
    stdout.flush().context("flush stdout")?;
    Ok(())
}

fn select_listed(books: Vec<NormalizedBook>, errors_only: bool) -> Vec<NormalizedBook> {
    if !errors_only {
        return books;
    }
    books.into_iter().filter(|b| !b.errors.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::diagnostics::ClassificationError;
    use crate::model::{AudienceCode, LanguageCode, TopicCode};

    #[test]
    fn status_lines() {
        assert_eq!(status_line(Table::Book, None), "Book: empty");
        let at = "2024-03-01T08:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(
            status_line(
                Table::Transaction,
                Some(&TableInfo {
                    count: 12,
                    last_modified: Some(at),
                })
            ),
            "Transaction: 12 rows, last import 2024-03-01T08:00:00+00:00"
        );
        assert_eq!(
            status_line(
                Table::Book,
                Some(&TableInfo {
                    count: 3,
                    last_modified: None,
                })
            ),
            "Book: 3 rows"
        );
    }

    #[test]
    fn errors_only_keeps_books_with_diagnostics() {
        let book = |id: &str, errors: Vec<ClassificationError>| NormalizedBook {
            id: id.to_owned(),
            title: "t".to_owned(),
            language: LanguageCode::Other,
            audience: AudienceCode::Adults,
            topic: TopicCode::Other,
            errors,
        };
        let books = vec![
            book("clean", Vec::new()),
            book("dirty", vec![ClassificationError::error("No language found", "dirty", "t")]),
        ];
        let listed = select_listed(books.clone(), true);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "dirty");
        assert_eq!(select_listed(books, false).len(), 2);
    }
}
