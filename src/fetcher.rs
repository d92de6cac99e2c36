use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};
use url::Url;

use crate::config::{AcquisitionStrategy, Config};
use crate::fetch_error::FetchError;

#[cfg(feature = "browser")]
pub mod browser;
pub mod download;
pub mod link_locator;

#[cfg(feature = "browser")]
pub use browser::BrowserFetcher;
pub use download::{wait_for_download, DownloadedFile};
pub use link_locator::{CssLink, HrefPattern, LinkLocator, LinkText, LocatedLink};

/// Produces the spreadsheet on local disk
#[async_trait]
pub trait Acquire: Send + Sync {
    async fn acquire(&self) -> Result<DownloadedFile, FetchError>;
}

/// Pick the link locator: a CSS selector or href pattern when configured,
/// otherwise the visible link text
pub fn link_locator(config: &Config) -> Result<Box<dyn LinkLocator>, FetchError> {
    if let Some(selector) = &config.link_selector {
        return Ok(Box::new(CssLink::new(selector.clone())?));
    }
    if let Some(pattern) = &config.link_href_pattern {
        return Ok(Box::new(HrefPattern::new(pattern)?));
    }
    Ok(Box::new(LinkText::contains(config.link_text.clone())))
}

/// Build the acquisition strategy selected in config
pub fn from_config(config: &Config) -> Result<Box<dyn Acquire>, FetchError> {
    let locator = link_locator(config)?;

    match config.acquisition {
        AcquisitionStrategy::Direct => Ok(Box::new(NocFileFetcher::new(
            config.court_url.clone(),
            locator,
            config.download_dir.clone(),
            config.download_file_name.clone(),
        )?)),
        #[cfg(feature = "browser")]
        AcquisitionStrategy::Browser => Ok(Box::new(BrowserFetcher::new(config, locator))),
        #[cfg(not(feature = "browser"))]
        AcquisitionStrategy::Browser => Err(FetchError::Browser(
            "browser acquisition requested but noc-sync was built without the `browser` feature"
                .to_string(),
        )),
    }
}

/// Finds the spreadsheet link on the court page and streams it to a fixed local path
pub struct NocFileFetcher {
    client: Client,
    page_url: String,
    locator: Box<dyn LinkLocator>,
    download_dir: PathBuf,
    file_name: String,
}

impl NocFileFetcher {
    pub fn new(
        page_url: String,
        locator: Box<dyn LinkLocator>,
        download_dir: PathBuf,
        file_name: String,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()?,
            page_url,
            locator,
            download_dir,
            file_name,
        })
    }

    pub fn target_path(&self) -> PathBuf {
        self.download_dir.join(&self.file_name)
    }

    /// Load the court page and pick out the download link
    #[instrument(skip(self), fields(url = %self.page_url))]
    pub async fn find_link(&self) -> Result<LocatedLink, FetchError> {
        let base = Url::parse(&self.page_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {e}", self.page_url)))?;

        debug!("Sending HTTP request to court website");
        let response = self.client.get(base.clone()).send().await?;
        let response = check_status(response, &self.page_url)?;

        let html = response.text().await?;
        info!("Court website loaded ({} bytes)", html.len());

        let link = self.locator.locate_in_html(&html, &base)?;
        info!("Found download link '{}' -> {}", link.text, link.url);
        Ok(link)
    }

    /// Stream `url` into the target path. A partial file is removed on failure.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn download(&self, url: &Url) -> Result<DownloadedFile, FetchError> {
        tokio::fs::create_dir_all(&self.download_dir).await?;
        let path = self.target_path();

        let response = self.client.get(url.clone()).send().await?;
        let response = check_status(response, url.as_str())?;

        let mut file = tokio::fs::File::create(&path).await?;
        let downloaded = DownloadedFile::new(&path);

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        info!("Temporary file saved: {} ({} bytes)", path.display(), written);
        Ok(downloaded)
    }
}

#[async_trait]
impl Acquire for NocFileFetcher {
    async fn acquire(&self) -> Result<DownloadedFile, FetchError> {
        let link = self.find_link().await?;
        self.download(&link.url).await
    }
}

/// An operator-supplied workbook (`--file`); never deleted
pub struct LocalFile {
    path: PathBuf,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Acquire for LocalFile {
    async fn acquire(&self) -> Result<DownloadedFile, FetchError> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Err(FetchError::NotFound(format!(
                "{} does not exist",
                self.path.display()
            )));
        }
        info!("Using local workbook {}", self.path.display());
        Ok(DownloadedFile::existing(&self.path))
    }
}

/// Map non-success statuses the same way for the page and the file
fn check_status(response: Response, what: &str) -> Result<Response, FetchError> {
    let status = response.status();

    if status.is_success() {
        Ok(response)
    } else if status.as_u16() == 404 {
        Err(FetchError::NotFound(format!("{what} not found on server")))
    } else if status.is_server_error() {
        Err(FetchError::ServerError(format!(
            "Server error {status} while requesting {what}"
        )))
    } else {
        Err(FetchError::UnexpectedStatus(format!(
            "HTTP {status} while requesting {what}"
        )))
    }
}

/// Lowercase extension of the configured download name, used to recognise browser downloads
pub fn expected_extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "xls".to_string())
}
