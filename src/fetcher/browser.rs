//! Chrome-driven acquisition for pages that only hand out the file to a real browser.

use async_trait::async_trait;
use backon::{ConstantBuilder, Retryable};
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::download::{wait_for_download, DownloadedFile};
use super::link_locator::{href_selector, LinkLocator};
use super::{expected_extension, Acquire};
use crate::config::Config;
use crate::fetch_error::FetchError;

const DOWNLOAD_POLL: Duration = Duration::from_millis(500);

pub struct BrowserFetcher {
    page_url: String,
    locator: Box<dyn LinkLocator>,
    download_dir: PathBuf,
    extension: String,
    chromedriver_path: PathBuf,
    port: u16,
    headless: bool,
    timeout: Duration,
}

impl BrowserFetcher {
    pub fn new(config: &Config, locator: Box<dyn LinkLocator>) -> Self {
        Self {
            page_url: config.court_url.clone(),
            locator,
            download_dir: config.download_dir.clone(),
            extension: expected_extension(&config.download_file_name),
            chromedriver_path: config.chromedriver_path.clone(),
            port: config.webdriver_port,
            headless: config.browser_headless,
            timeout: config.download_timeout(),
        }
    }

    /// Navigate, click the matching link and wait for Chrome to finish writing the file
    #[instrument(skip(self, client), fields(url = %self.page_url))]
    async fn click_and_wait(&self, client: &Client, run_dir: &Path) -> Result<PathBuf, FetchError> {
        let base = Url::parse(&self.page_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {e}", self.page_url)))?;

        client.goto(base.as_str()).await.map_err(browser_error)?;
        info!("Court website loaded");

        let source = client.source().await.map_err(browser_error)?;
        let link = self.locator.locate_in_html(&source, &base)?;
        debug!("Clicking link '{}' ({})", link.text, link.href);

        let selector = href_selector(&link.href);
        client
            .find(Locator::Css(&selector))
            .await
            .map_err(browser_error)?
            .click()
            .await
            .map_err(browser_error)?;

        info!("Downloading file");
        wait_for_download(run_dir, &self.extension, self.timeout, DOWNLOAD_POLL).await
    }

    async fn connect(&self, download_dir: &Path) -> Result<Client, FetchError> {
        let mut args = vec!["--disable-gpu".to_string(), "--no-sandbox".to_string()];
        if self.headless {
            args.push("--headless=new".to_string());
        }

        let mut caps = serde_json::Map::new();
        caps.insert(
            "goog:chromeOptions".to_string(),
            json!({
                "args": args,
                "prefs": {
                    "profile.default_content_settings.popups": 0,
                    "download.prompt_for_download": false,
                    "download.default_directory": download_dir.to_string_lossy(),
                }
            }),
        );

        let webdriver_url = format!("http://localhost:{}", self.port);

        // chromedriver needs a moment before it accepts sessions
        let backoff = ConstantBuilder::default()
            .with_delay(Duration::from_millis(250))
            .with_max_times(20);

        (|| async {
            ClientBuilder::native()
                .capabilities(caps.clone())
                .connect(&webdriver_url)
                .await
        })
        .retry(backoff)
        .sleep(tokio::time::sleep)
        .notify(|e, delay| debug!("chromedriver not ready ({}), retrying in {:?}", e, delay))
        .await
        .map_err(|e| FetchError::Browser(format!("could not open WebDriver session: {e}")))
    }
}

#[async_trait]
impl Acquire for BrowserFetcher {
    async fn acquire(&self) -> Result<DownloadedFile, FetchError> {
        tokio::fs::create_dir_all(&self.download_dir).await?;
        let run_dir = tempfile::Builder::new()
            .prefix("noc-download-")
            .tempdir_in(&self.download_dir)?;

        info!("Launching chromedriver at {}", self.chromedriver_path.display());
        let mut driver = ChromeDriver::spawn(&self.chromedriver_path, self.port)?;

        let result = match self.connect(run_dir.path()).await {
            Ok(client) => {
                let result = self.click_and_wait(&client, run_dir.path()).await;
                info!("Closing Chrome browser");
                if let Err(e) = client.close().await {
                    warn!("Failed to close browser session: {}", e);
                }
                result
            }
            Err(e) => Err(e),
        };

        driver.terminate().await;

        let path = result?;
        Ok(DownloadedFile::in_run_dir(path, run_dir))
    }
}

/// chromedriver child process, killed when dropped
struct ChromeDriver {
    child: Child,
}

impl ChromeDriver {
    fn spawn(binary: &Path, port: u16) -> Result<Self, FetchError> {
        let child = Command::new(binary)
            .arg(format!("--port={port}"))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FetchError::Browser(format!("failed to start {}: {e}", binary.display())))?;
        Ok(Self { child })
    }

    async fn terminate(&mut self) {
        info!("Terminating chromedriver process");
        if let Err(e) = self.child.kill().await {
            warn!("Failed to kill chromedriver: {}", e);
        }
    }
}

fn browser_error(e: fantoccini::error::CmdError) -> FetchError {
    FetchError::Browser(e.to_string())
}
