use backon::{ConstantBuilder, Retryable};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::fetch_error::FetchError;

/// Extensions browsers use while a download is still being written
const PARTIAL_EXTENSIONS: [&str; 3] = ["crdownload", "part", "tmp"];

/// A spreadsheet on local disk that is removed when dropped.
///
/// Every pipeline exit path drops this handle, so the temp file never
/// outlives the run unless [`DownloadedFile::keep`] was called.
#[derive(Debug)]
pub struct DownloadedFile {
    path: PathBuf,
    keep: bool,
    run_dir: Option<TempDir>,
}

impl DownloadedFile {
    /// Take ownership of a file this run wrote
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keep: false,
            run_dir: None,
        }
    }

    /// A file written into a per-run scratch directory; both go away on drop
    pub fn in_run_dir(path: impl Into<PathBuf>, run_dir: TempDir) -> Self {
        Self {
            path: path.into(),
            keep: false,
            run_dir: Some(run_dir),
        }
    }

    /// Wrap a file supplied by the operator. It is never deleted.
    pub fn existing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keep: true,
            run_dir: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Leave the file (and its run directory) on disk after the run
    pub fn keep(&mut self) {
        self.keep = true;
        if let Some(dir) = self.run_dir.take() {
            let kept = dir.keep();
            debug!("Keeping download directory {}", kept.display());
        }
    }
}

impl Drop for DownloadedFile {
    fn drop(&mut self) {
        if self.keep {
            info!("Keeping downloaded file {}", self.path.display());
            return;
        }

        info!("Deleting temporary file {}", self.path.display());
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Temporary file {} already gone", self.path.display());
            }
            Err(e) => warn!("Failed to delete {}: {}", self.path.display(), e),
        }
    }
}

/// Wait for a browser-native download to land in `dir`.
///
/// Polls every `poll` until exactly one completed file with `extension`
/// exists and nothing is still being written. Gives up after `timeout`.
/// Two or more candidates fail immediately rather than guessing.
pub async fn wait_for_download(
    dir: &Path,
    extension: &str,
    timeout: Duration,
    poll: Duration,
) -> Result<PathBuf, FetchError> {
    let max_times = (timeout.as_millis() / poll.as_millis().max(1)) as usize;
    let backoff = ConstantBuilder::default()
        .with_delay(poll)
        .with_max_times(max_times);

    info!(
        "Waiting up to {}s for *.{} download in {}",
        timeout.as_secs(),
        extension,
        dir.display()
    );

    let result = (|| async { scan_download_dir(dir, extension) })
        .retry(backoff)
        .sleep(tokio::time::sleep)
        .when(|e| matches!(e, FetchError::DownloadPending(_)))
        .notify(|_, delay| debug!("Download not finished, checking again in {:?}", delay))
        .await;

    match result {
        Ok(path) => {
            info!("Download complete: {}", path.display());
            Ok(path)
        }
        Err(FetchError::DownloadPending(dir)) => Err(FetchError::DownloadTimeout {
            dir,
            waited_secs: timeout.as_secs(),
        }),
        Err(e) => Err(e),
    }
}

/// One look at the download directory
pub fn scan_download_dir(dir: &Path, extension: &str) -> Result<PathBuf, FetchError> {
    let mut candidates = Vec::new();
    let mut in_progress = false;

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }

        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };

        if PARTIAL_EXTENSIONS.iter().any(|p| ext.eq_ignore_ascii_case(p)) {
            in_progress = true;
        } else if ext.eq_ignore_ascii_case(extension) {
            candidates.push(path);
        }
    }

    if candidates.len() > 1 {
        candidates.sort();
        return Err(FetchError::AmbiguousDownload { candidates });
    }

    match candidates.pop() {
        Some(path) if !in_progress => Ok(path),
        _ => Err(FetchError::DownloadPending(dir.to_path_buf())),
    }
}
