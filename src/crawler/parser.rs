//! HTML parser for extracting links and metadata
//!
//! This module handles parsing HTML content to extract:
//! - Same-origin links to follow (from `<a>` tags)
//! - Page title

use crate::url::{normalize_parsed, same_origin};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// An outbound link discovered on a page
///
/// Only `url` identifies a link; the anchor text is informational.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Normalized absolute URL
    pub url: Url,

    /// Visible text of the first anchor that pointed at `url`
    pub anchor_text: String,
}

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// Same-origin links in document order, without duplicates
    pub links: Vec<Link>,
}

/// Parses HTML content and extracts the title and same-origin links
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags anywhere in the document, resolved against
///   `base_url` as given and then normalized
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs and fragment-only links
/// - Links whose scheme, host or port differ from `base_url`'s
///
/// Parsing never fails; malformed markup yields whatever anchors the HTML
/// parser recovered.
///
/// # Example
///
/// ```
/// use ripple_queue::crawler::parse_page;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_page(html, &base_url);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links[0].url.as_str(), "https://example.com/page");
/// ```
pub fn parse_page(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        title: extract_title(&document),
        links: collect_links(&document, base_url, base_url),
    }
}

/// Parses a fetched page whose links are filtered against another origin
///
/// Relative links resolve against `page_url` exactly as it was fetched
/// (after redirects, trailing slash intact); only links sharing `origin`'s
/// scheme, host and port are kept.
pub fn parse_fetched_page(html: &str, page_url: &Url, origin: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        title: extract_title(&document),
        links: collect_links(&document, page_url, origin),
    }
}

/// Extracts the same-origin links of a page
pub fn extract_links(html: &str, base_url: &Url) -> Vec<Link> {
    collect_links(&Html::parse_document(html), base_url, base_url)
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolves anchors against `base_url` and keeps those sharing `origin`
///
/// The base is used as given: normalizing it would drop a directory's
/// trailing slash and resolve `href="intro"` one level too high.
fn collect_links(document: &Html, base_url: &Url, origin: &Url) -> Vec<Link> {
    let Ok(a_selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&a_selector) {
        if element.value().attr("download").is_some() {
            continue;
        }

        let Some(url) = element
            .value()
            .attr("href")
            .and_then(|href| resolve_link(href, base_url))
        else {
            continue;
        };

        if !same_origin(&url, origin) {
            tracing::trace!("Dropping cross-origin link {}", url);
            continue;
        }

        if seen.insert(url.as_str().to_string()) {
            links.push(Link {
                url,
                anchor_text: anchor_text(&element),
            });
        }
    }

    links
}

/// Collapses an anchor's text nodes into a single line
fn anchor_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves a link href to a normalized absolute URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if lowered.starts_with("javascript:")
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("data:")
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    normalize_parsed(absolute_url).ok()
}
