use lettre::message::Mailbox;
use regex::Regex;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::loader::PropagationTarget;
use crate::record::Reportable;

pub const DEFAULT_LINK_TEXT: &str = "(3) NOC_NIBRS (current)";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {msg}")]
    Invalid { key: &'static str, msg: String },
}

/// How the spreadsheet is pulled off the court website
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionStrategy {
    /// Read the link's href and stream it straight to disk
    Direct,
    /// Click the link in a chromedriver-controlled Chrome session
    Browser,
}

impl FromStr for AcquisitionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "http" => Ok(AcquisitionStrategy::Direct),
            "browser" | "chrome" => Ok(AcquisitionStrategy::Browser),
            other => Err(format!("unknown acquisition strategy '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub court_url: String,
    pub link_text: String,
    /// Match the download link by href regex instead of its text
    pub link_href_pattern: Option<String>,
    /// Match the download link by CSS selector instead of its text
    pub link_selector: Option<String>,
    pub download_dir: PathBuf,
    pub download_file_name: String,
    pub acquisition: AcquisitionStrategy,
    pub chromedriver_path: PathBuf,
    pub webdriver_port: u16,
    pub browser_headless: bool,
    pub download_timeout_secs: u64,

    pub database_url: String,
    pub reporting_db_name: String,
    pub courtview_db_name: Option<String>,
    pub exchange_db_name: Option<String>,
    pub staging_table: String,

    pub smtp_host: String,
    pub smtp_port: u16,
    pub reply_email_address: Mailbox,
    pub dev_email_address: Mailbox,
    pub notification_email_addresses: Vec<Mailbox>,

    pub log_file: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (the environment in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let staging_table = get("STAGING_TABLE").unwrap_or_else(|| "noc_list".to_string());
        validate_identifier("STAGING_TABLE", &staging_table)?;

        let link_href_pattern = get("LINK_HREF_PATTERN");
        let link_selector = get("LINK_SELECTOR");
        validate_link_overrides(link_href_pattern.as_deref(), link_selector.as_deref())?;

        Ok(Config {
            court_url: required("COURT_URL")?,
            link_text: get("LINK_TEXT").unwrap_or_else(|| DEFAULT_LINK_TEXT.to_string()),
            link_href_pattern,
            link_selector,
            download_dir: get("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join("noc-sync")),
            download_file_name: get("DOWNLOAD_FILE_NAME")
                .unwrap_or_else(|| "noc_nibrs.xls".to_string()),
            acquisition: parse_or("ACQUISITION_STRATEGY", get("ACQUISITION_STRATEGY"), AcquisitionStrategy::Direct)?,
            chromedriver_path: get("CHROMEDRIVER_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("chromedriver")),
            webdriver_port: parse_or("WEBDRIVER_PORT", get("WEBDRIVER_PORT"), 4444)?,
            browser_headless: parse_or("BROWSER_HEADLESS", get("BROWSER_HEADLESS"), true)?,
            download_timeout_secs: parse_or("DOWNLOAD_TIMEOUT_SECS", get("DOWNLOAD_TIMEOUT_SECS"), 60)?,

            database_url: required("DATABASE_URL")?,
            reporting_db_name: required("REPORTING_DB_NAME")?,
            courtview_db_name: get("COURTVIEW_DB_NAME"),
            exchange_db_name: get("EXCHANGE_DB_NAME"),
            staging_table,

            smtp_host: required("SMTP_HOST")?,
            smtp_port: parse_or("SMTP_PORT", get("SMTP_PORT"), 25)?,
            reply_email_address: parse_mailbox("REPLY_EMAIL_ADDRESS", &required("REPLY_EMAIL_ADDRESS")?)?,
            dev_email_address: parse_mailbox("DEV_EMAIL_ADDRESS", &required("DEV_EMAIL_ADDRESS")?)?,
            notification_email_addresses: parse_mailbox_list(
                "NOTIFICATION_EMAIL_ADDRESSES",
                &required("NOTIFICATION_EMAIL_ADDRESSES")?,
            )?,

            log_file: get("LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs/noc-sync.log")),
        })
    }

    /// Downstream databases and the code types pushed into each, in call order
    pub fn propagation_targets(&self) -> Vec<PropagationTarget> {
        let mut targets = Vec::new();

        if let Some(courtview) = &self.courtview_db_name {
            targets.push(PropagationTarget::new(courtview, Reportable::No, "OffenseCode"));
        }

        if let Some(exchange) = &self.exchange_db_name {
            targets.push(PropagationTarget::new(exchange, Reportable::No, "OffenseCode"));
            targets.push(PropagationTarget::new(
                exchange,
                Reportable::Yes,
                "ReportableOffenseCode",
            ));
        }

        targets
    }

    pub fn download_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.download_timeout_secs)
    }
}

fn parse_or<T>(key: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            msg: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_mailbox(key: &'static str, value: &str) -> Result<Mailbox, ConfigError> {
    value.trim().parse().map_err(|e: lettre::address::AddressError| ConfigError::Invalid {
        key,
        msg: format!("'{value}': {e}"),
    })
}

fn parse_mailbox_list(key: &'static str, value: &str) -> Result<Vec<Mailbox>, ConfigError> {
    let mailboxes = value
        .split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_mailbox(key, s))
        .collect::<Result<Vec<_>, _>>()?;

    if mailboxes.is_empty() {
        return Err(ConfigError::Missing(key));
    }
    Ok(mailboxes)
}

/// At most one of the link overrides may be set, and it must compile
fn validate_link_overrides(pattern: Option<&str>, selector: Option<&str>) -> Result<(), ConfigError> {
    match (pattern, selector) {
        (Some(_), Some(_)) => Err(ConfigError::Invalid {
            key: "LINK_SELECTOR",
            msg: "set either LINK_HREF_PATTERN or LINK_SELECTOR, not both".to_string(),
        }),
        (Some(pattern), None) => Regex::new(pattern).map(|_| ()).map_err(|e| ConfigError::Invalid {
            key: "LINK_HREF_PATTERN",
            msg: e.to_string(),
        }),
        (None, Some(selector)) => scraper::Selector::parse(selector)
            .map(|_| ())
            .map_err(|e| ConfigError::Invalid {
                key: "LINK_SELECTOR",
                msg: format!("'{selector}': {e}"),
            }),
        (None, None) => Ok(()),
    }
}

/// Table names are interpolated into SQL, so only plain (optionally schema-qualified) identifiers pass
fn validate_identifier(key: &'static str, value: &str) -> Result<(), ConfigError> {
    let re = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .map_err(|e| ConfigError::Invalid { key, msg: e.to_string() })?;

    if re.is_match(value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            key,
            msg: format!("'{value}' is not a valid table identifier"),
        })
    }
}
