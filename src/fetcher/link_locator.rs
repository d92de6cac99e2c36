//! Strategies for picking the spreadsheet link out of the court's download page.
//!
//! The page is only identified by visible link text, which breaks whenever the
//! court renames the file. Keeping the lookup behind [`LinkLocator`] lets a
//! deployment switch to an href pattern or a CSS selector through config.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::fetch_error::FetchError;

/// A link found on the page, with its raw and resolved targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedLink {
    pub text: String,
    /// `href` exactly as written in the page
    pub href: String,
    /// `href` resolved against the page URL
    pub url: Url,
}

pub trait LinkLocator: Send + Sync {
    /// Human-readable form of what is being matched, used in errors and logs
    fn describe(&self) -> String;

    /// Find the first matching link in document order
    fn locate(&self, document: &Html, base: &Url) -> Result<LocatedLink, FetchError>;

    /// Parse `html` and locate the link. The parsed document never outlives this call.
    fn locate_in_html(&self, html: &str, base: &Url) -> Result<LocatedLink, FetchError> {
        let document = Html::parse_document(html);
        self.locate(&document, base)
    }
}

/// Matches anchors by their visible text
#[derive(Debug, Clone)]
pub struct LinkText {
    text: String,
    exact: bool,
}

impl LinkText {
    /// Anchor text must contain `text`
    pub fn contains(text: impl Into<String>) -> Self {
        Self {
            text: normalize_whitespace(&text.into()),
            exact: false,
        }
    }

    /// Anchor text must equal `text` after whitespace normalization
    pub fn exact(text: impl Into<String>) -> Self {
        Self {
            text: normalize_whitespace(&text.into()),
            exact: true,
        }
    }
}

impl LinkLocator for LinkText {
    fn describe(&self) -> String {
        if self.exact {
            format!("link text == '{}'", self.text)
        } else {
            format!("link text containing '{}'", self.text)
        }
    }

    fn locate(&self, document: &Html, base: &Url) -> Result<LocatedLink, FetchError> {
        let anchors = anchor_selector()?;

        document
            .select(&anchors)
            .find(|a| {
                let text = anchor_text(a);
                if self.exact {
                    text == self.text
                } else {
                    text.contains(&self.text)
                }
            })
            .map(|a| resolve(a, base))
            .unwrap_or_else(|| Err(FetchError::LinkNotFound(self.describe())))
    }
}

/// Matches anchors whose `href` matches a regular expression
#[derive(Debug, Clone)]
pub struct HrefPattern {
    pattern: Regex,
}

impl HrefPattern {
    pub fn new(pattern: &str) -> Result<Self, FetchError> {
        let pattern = Regex::new(pattern)
            .map_err(|e| FetchError::InvalidUrl(format!("bad href pattern '{pattern}': {e}")))?;
        Ok(Self { pattern })
    }
}

impl LinkLocator for HrefPattern {
    fn describe(&self) -> String {
        format!("href matching /{}/", self.pattern.as_str())
    }

    fn locate(&self, document: &Html, base: &Url) -> Result<LocatedLink, FetchError> {
        let anchors = anchor_selector()?;

        document
            .select(&anchors)
            .find(|a| {
                a.value()
                    .attr("href")
                    .is_some_and(|href| self.pattern.is_match(href))
            })
            .map(|a| resolve(a, base))
            .unwrap_or_else(|| Err(FetchError::LinkNotFound(self.describe())))
    }
}

/// First element matched by a CSS selector that carries an `href`
#[derive(Debug, Clone)]
pub struct CssLink {
    selector: String,
}

impl CssLink {
    pub fn new(selector: impl Into<String>) -> Result<Self, FetchError> {
        let selector = selector.into();
        parse_selector(&selector)?;
        Ok(Self { selector })
    }
}

impl LinkLocator for CssLink {
    fn describe(&self) -> String {
        format!("selector '{}'", self.selector)
    }

    fn locate(&self, document: &Html, base: &Url) -> Result<LocatedLink, FetchError> {
        let selector = parse_selector(&self.selector)?;

        document
            .select(&selector)
            .find(|el| el.value().attr("href").is_some())
            .map(|el| resolve(el, base))
            .unwrap_or_else(|| Err(FetchError::LinkNotFound(self.describe())))
    }
}

fn parse_selector(selector: &str) -> Result<Selector, FetchError> {
    Selector::parse(selector)
        .map_err(|e| FetchError::InvalidUrl(format!("bad CSS selector '{selector}': {e}")))
}

/// Anchors without an `href` can never be downloaded, so they are not candidates
fn anchor_selector() -> Result<Selector, FetchError> {
    parse_selector("a[href]")
}

/// CSS selector for the anchor whose `href` is exactly `href`
pub fn href_selector(href: &str) -> String {
    let escaped = href.replace('\\', "\\\\").replace('"', "\\\"");
    format!(r#"a[href="{escaped}"]"#)
}

fn anchor_text(element: &ElementRef) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn resolve(element: ElementRef, base: &Url) -> Result<LocatedLink, FetchError> {
    let text = anchor_text(&element);
    let href = element
        .value()
        .attr("href")
        .ok_or_else(|| FetchError::InvalidUrl(format!("link '{text}' has no href")))?
        .trim()
        .to_string();

    let url = base
        .join(&href)
        .map_err(|e| FetchError::InvalidUrl(format!("{href}: {e}")))?;

    Ok(LocatedLink { text, href, url })
}
