use std::fs;
use std::path::Path;

use predicates::prelude::*;

const CATALOG: &str = r#"{
    "10": {"books_id": "10", "title": "Gulistan", "language": ["Farsi"], "tags": ["Persian", "Adults", "Poetry"]},
    "11": {"books_id": "11", "title": "Untagged", "tags": []}
}"#;

const TRANSACTIONS: &str = "\
Item #,Item Status,Item Entry date
10,Checked out,2024-03-05 10:00:00
11,Renewed,2024-03-06 12:00:00
";

fn bin() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("library-weekly-reports")
}

fn import_all(data_dir: &Path, work: &Path) {
    let catalog = work.join("catalog.json");
    let transactions = work.join("transactions.csv");
    fs::write(&catalog, CATALOG).unwrap();
    fs::write(&transactions, TRANSACTIONS).unwrap();

    bin()
        .args(["import-books", "--data-dir"])
        .arg(data_dir)
        .arg("--file")
        .arg(&catalog)
        .args(["--last-modified", "2024-03-07T08:00:00Z"])
        .assert()
        .success();
    bin()
        .args(["import-transactions", "--data-dir"])
        .arg(data_dir)
        .arg("--file")
        .arg(&transactions)
        .assert()
        .success();
}

#[test]
fn import_then_report_writes_csv() {
    let work = tempfile::tempdir().unwrap();
    let data_dir = work.path().join("data");
    import_all(&data_dir, work.path());

    let out = work.path().join("out/report.csv");
    bin()
        .args(["report", "--data-dir"])
        .arg(&data_dir)
        .args(["--from", "2024-03-04", "--to", "2024-03-08", "--out"])
        .arg(&out)
        .assert()
        .success();

    let csv = fs::read_to_string(&out).unwrap();
    assert_eq!(csv.lines().count(), 35);
    let second = csv.lines().nth(1).unwrap();
    assert!(second.starts_with("Monday,Tuesday,Wednesday,Thursday,Friday,Week total,,Total"));
    assert!(csv.contains("R[0]C[-5]:R[0]C[-1]"));

    bin()
        .args(["report", "--data-dir"])
        .arg(&data_dir)
        .args(["--from", "2024-03-04", "--to", "2024-03-08", "--out"])
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn status_and_books_show_imported_state() {
    let work = tempfile::tempdir().unwrap();
    let data_dir = work.path().join("data");
    import_all(&data_dir, work.path());

    bin()
        .args(["status", "--data-dir"])
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Book: 2 rows, last import 2024-03-07T08:00:00+00:00",
        ))
        .stdout(predicate::str::contains("Transaction: 2 rows, last import"));

    bin()
        .args(["books", "--errors-only", "--data-dir"])
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("No language found"))
        .stdout(predicate::str::contains("\"id\":\"10\"").not());
}

#[test]
fn strict_import_fails_on_classification_error() {
    let work = tempfile::tempdir().unwrap();
    let catalog = work.path().join("catalog.json");
    fs::write(&catalog, CATALOG).unwrap();

    bin()
        .args(["import-books", "--strict", "--no-metadata", "--data-dir"])
        .arg(work.path().join("data"))
        .arg("--file")
        .arg(&catalog)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No language found"));
}

#[test]
fn reversed_range_is_rejected() {
    let work = tempfile::tempdir().unwrap();
    bin()
        .args(["report", "--data-dir"])
        .arg(work.path().join("data"))
        .args(["--from", "2024-03-08", "--to", "2024-03-04", "--out"])
        .arg(work.path().join("report.csv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("reversed"));
}

#[test]
fn empty_range_writes_nothing() {
    let work = tempfile::tempdir().unwrap();
    let out = work.path().join("report.csv");
    bin()
        .args(["report", "--data-dir"])
        .arg(work.path().join("data"))
        .args(["--from", "2024-03-04", "--to", "2024-03-08", "--out"])
        .arg(&out)
        .assert()
        .success();
    assert!(!out.exists());
}

#[test]
fn rust_log_debug_emits_debug_line_to_stderr() {
    let work = tempfile::tempdir().unwrap();
    bin()
        .env("RUST_LOG", "debug")
        .args(["status", "--data-dir"])
        .arg(work.path().join("data"))
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));
}

#[test]
fn verbose_flag_enables_debug_without_rust_log() {
    let work = tempfile::tempdir().unwrap();
    bin()
        .env_remove("RUST_LOG")
        .args(["status", "-v", "--data-dir"])
        .arg(work.path().join("data"))
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));

    bin()
        .env_remove("RUST_LOG")
        .args(["status", "--data-dir"])
        .arg(work.path().join("data"))
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli").not());
}
