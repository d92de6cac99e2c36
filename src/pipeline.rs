use std::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::fetch_error::FetchError;
use crate::fetcher::{Acquire, DownloadedFile};
use crate::loader::{Load, LoadError, LoadSummary};
use crate::notifier::{NotificationKind, Notifier};
use crate::parser::{NocParser, ParseError};
use crate::record::NocRecord;

pub const SUCCESS_SUBJECT: &str = "Broker NOC Update Completed Successfully!";

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Error occurred while downloading NOC file from court website: {0}")]
    Acquisition(#[from] FetchError),

    #[error("Error working with Excel file: {0}")]
    Parse(#[from] ParseError),

    #[error("SQL exception occurred: {0}")]
    Persistence(#[from] LoadError),
}

impl PipelineError {
    /// Process exit status for schedulers and monitoring
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Acquisition(_) => 2,
            PipelineError::Parse(_) => 3,
            PipelineError::Persistence(_) => 4,
        }
    }

    /// Subject line of the developer email
    pub fn subject(&self) -> &'static str {
        match self {
            PipelineError::Acquisition(_) => {
                "Error occurred while downloading NOC file from court website"
            }
            PipelineError::Parse(_) => "Error working with Excel file! Please check exception",
            PipelineError::Persistence(_) => "SQL Exception occurred! Please check exception",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Leave the downloaded workbook on disk
    pub keep_file: bool,
    /// Stop after parsing; no database writes, no success email
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub records: Vec<NocRecord>,
    /// `None` for dry runs
    pub load: Option<LoadSummary>,
}

/// Fetch → parse → load → notify, once
pub struct Pipeline {
    acquirer: Box<dyn Acquire>,
    loader: Box<dyn Load>,
    notifier: Box<dyn Notifier>,
    options: RunOptions,
}

impl Pipeline {
    pub fn new(
        acquirer: Box<dyn Acquire>,
        loader: Box<dyn Load>,
        notifier: Box<dyn Notifier>,
        options: RunOptions,
    ) -> Self {
        Self {
            acquirer,
            loader,
            notifier,
            options,
        }
    }

    /// Run every step. Any failure sends one developer email and is returned;
    /// a full success sends the success email.
    #[instrument(skip(self), fields(dry_run = self.options.dry_run))]
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let started = Instant::now();

        match self.execute().await {
            Ok(report) => {
                info!(
                    "Broker NOC update complete in {:.1}s",
                    started.elapsed().as_secs_f64()
                );
                if !self.options.dry_run {
                    self.send(NotificationKind::Success, SUCCESS_SUBJECT).await;
                }
                Ok(report)
            }
            Err(e) => {
                report_failure(self.notifier.as_ref(), &e).await;
                Err(e)
            }
        }
    }

    async fn execute(&self) -> Result<RunReport, PipelineError> {
        info!("Acquiring NOC spreadsheet");
        let mut file = self.acquirer.acquire().await?;
        if self.options.keep_file {
            file.keep();
        }

        let records = parse_downloaded(file).await?;

        if self.options.dry_run {
            info!("Dry run: skipping database load ({} records parsed)", records.len());
            return Ok(RunReport {
                records,
                load: None,
            });
        }

        let summary = self.loader.load(&records).await?;
        log_summary(&summary);

        Ok(RunReport {
            records,
            load: Some(summary),
        })
    }

    async fn send(&self, kind: NotificationKind, subject: &str) {
        if let Err(e) = self.notifier.notify(kind, subject).await {
            error!("Error occurred sending log file email: {}", e);
        }
    }
}

/// Log a failed run and send the one developer email it gets.
/// Delivery problems are logged, never returned.
pub async fn report_failure(notifier: &dyn Notifier, error: &PipelineError) {
    error!("{}", error);
    if let Err(e) = notifier.notify(NotificationKind::Developer, error.subject()).await {
        error!("Error occurred sending log file email: {}", e);
    }
}

/// Parse off the async runtime. `file` is dropped (and deleted) before this
/// returns, whether parsing worked or not.
async fn parse_downloaded(file: DownloadedFile) -> Result<Vec<NocRecord>, ParseError> {
    let parser = NocParser::new(file.path());
    let result = tokio::task::spawn_blocking(move || parser.parse())
        .await
        .map_err(|e| ParseError::Task(e.to_string()));

    drop(file);
    result?
}

fn log_summary(summary: &LoadSummary) {
    info!(
        "Staging table: {} cleared, {} attempted, {} inserted",
        summary.cleared, summary.attempted, summary.inserted
    );
    if !summary.failed_ids.is_empty() {
        warn!("Rows skipped after insert failures: {:?}", summary.failed_ids);
    }
    for result in &summary.propagated {
        info!(
            "Propagated {} {} codes to {}",
            result.applied, result.code_type, result.database
        );
    }
}
