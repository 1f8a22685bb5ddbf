use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use library_weekly_reports::cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    library_weekly_reports::logging::init(cli.verbose).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        Command::ImportBooks(args) => {
            library_weekly_reports::catalog::run(args)
                .await
                .context("import books")?;
        }
        Command::ImportTransactions(args) => {
            library_weekly_reports::transactions::run(args)
                .await
                .context("import transactions")?;
        }
        Command::Report(args) => {
            library_weekly_reports::report::run(args)
                .await
                .context("report")?;
        }
        Command::Status(args) => {
            library_weekly_reports::inspect::status(args)
                .await
                .context("status")?;
        }
        Command::Books(args) => {
            library_weekly_reports::inspect::books(args)
                .await
                .context("books")?;
        }
    }

    Ok(())
}
