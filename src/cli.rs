use chrono::{DateTime, NaiveDate, Utc};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// More log output (-v debug, -vv trace). Ignored when RUST_LOG is set.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Classify a catalog export and replace the Book table.
    ImportBooks(ImportBooksArgs),
    /// Replace the Transaction table with a transaction log.
    ImportTransactions(ImportTransactionsArgs),
    /// Build the weekly spreadsheet for a date range.
    Report(ReportArgs),
    /// Show row counts and last import times.
    Status(StatusArgs),
    /// List stored books as JSON lines.
    Books(BooksArgs),
}

#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// Directory holding the table files.
    #[arg(long, default_value = "library-data")]
    pub data_dir: String,
}

#[derive(Debug, Clone, Args)]
pub struct ImportMetadataArgs {
    /// Import timestamp (RFC 3339). Defaults to the input file's modification time.
    #[arg(long)]
    pub last_modified: Option<DateTime<Utc>>,

    /// Do not record an import timestamp.
    #[arg(long, conflicts_with = "last_modified")]
    pub no_metadata: bool,
}

#[derive(Debug, Args)]
pub struct ImportBooksArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Catalog export (JSON array or object of entries).
    #[arg(long)]
    pub file: String,

    #[command(flatten)]
    pub metadata: ImportMetadataArgs,

    /// Abort on the first error-level classification problem.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Args)]
pub struct ImportTransactionsArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Transaction log (CSV with "Item #", "Item Status", "Item Entry date").
    #[arg(long)]
    pub file: String,

    #[command(flatten)]
    pub metadata: ImportMetadataArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Csv,
    Html,
    Json,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// First day of the report (YYYY-MM-DD).
    #[arg(long)]
    pub from: NaiveDate,

    /// Last day of the report, inclusive (YYYY-MM-DD).
    #[arg(long)]
    pub to: NaiveDate,

    /// Output file path.
    #[arg(long)]
    pub out: String,

    #[arg(long, value_enum, default_value_t = ReportFormat::Csv)]
    pub format: ReportFormat,

    /// Overwrite the output file if it exists.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Args)]
pub struct BooksArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Only list books with classification problems.
    #[arg(long)]
    pub errors_only: bool,
}
