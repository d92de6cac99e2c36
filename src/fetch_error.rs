use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("No download link matching {0} found on page")]
    LinkNotFound(String),
    #[error("File not found (404): {0}")]
    NotFound(String),
    #[error("Server error (5xx): {0}")]
    ServerError(String),
    #[error("Unexpected response: {0}")]
    UnexpectedStatus(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Download still in progress in {}", .0.display())]
    DownloadPending(PathBuf),
    #[error("No downloaded file found in {} after {waited_secs}s", .dir.display())]
    DownloadTimeout { dir: PathBuf, waited_secs: u64 },
    #[error("Ambiguous download: {} candidate files found: {:?}", .candidates.len(), .candidates)]
    AmbiguousDownload { candidates: Vec<PathBuf> },
    #[error("Browser automation failed: {0}")]
    Browser(String),
}
