use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, instrument};

use noc_sync::config::Config;
use noc_sync::fetcher::{self, Acquire, LocalFile};
use noc_sync::loader::PostgresLoader;
use noc_sync::logging;
use noc_sync::notifier::{LogOnlyNotifier, Notifier, SmtpNotifier};
use noc_sync::pipeline::{report_failure, Pipeline, PipelineError, RunOptions};

#[derive(Parser)]
#[command(name = "noc-sync")]
#[command(about = "Sync the court's NOC/NIBRS code list into the reporting databases", long_about = None)]
struct Cli {
    /// Parse a local workbook instead of downloading from the court website
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Fetch and parse only; print the records as JSON and touch no database
    #[arg(long)]
    dry_run: bool,

    /// Keep the downloaded workbook instead of deleting it
    #[arg(long)]
    keep_file: bool,

    /// Log notifications instead of emailing them
    #[arg(long)]
    no_email: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = logging::init(&config.log_file) {
        eprintln!("Failed to open log file {}: {e}", config.log_file.display());
        return ExitCode::from(1);
    }

    run(cli, config).await
}

#[instrument(skip_all)]
async fn run(cli: Cli, config: Config) -> ExitCode {
    info!(
        court_url = %config.court_url,
        strategy = ?config.acquisition,
        staging_table = %config.staging_table,
        "Starting NOC sync"
    );

    let loader = PostgresLoader::new(
        config.database_url.clone(),
        config.staging_table.clone(),
        config.reporting_db_name.clone(),
        config.propagation_targets(),
    );

    let notifier: Box<dyn Notifier> = if cli.no_email || cli.dry_run {
        Box::new(LogOnlyNotifier)
    } else {
        Box::new(SmtpNotifier::new(&config))
    };

    // A strategy that cannot be built is an acquisition failure, reported like one
    let acquirer: Box<dyn Acquire> = match &cli.file {
        Some(path) => Box::new(LocalFile::new(path)),
        None => match fetcher::from_config(&config) {
            Ok(acquirer) => acquirer,
            Err(e) => {
                let e = PipelineError::from(e);
                report_failure(notifier.as_ref(), &e).await;
                return ExitCode::from(e.exit_code());
            }
        },
    };

    let options = RunOptions {
        keep_file: cli.keep_file,
        dry_run: cli.dry_run,
    };

    let pipeline = Pipeline::new(acquirer, Box::new(loader), notifier, options);

    match pipeline.run().await {
        Ok(report) => {
            if cli.dry_run {
                match serde_json::to_string_pretty(&report.records) {
                    Ok(json) => println!("{json}"),
                    Err(e) => error!("Failed to serialize records: {}", e),
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => ExitCode::from(e.exit_code()),
    }
}
