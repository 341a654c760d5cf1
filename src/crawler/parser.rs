//! HTML extraction for fetched pages
//!
//! Pulls the fields an ingestion record needs out of a document:
//! - `<title>` text
//! - `<meta name="description">` content
//! - outbound links (`<a href>`), resolved against the page URL

use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Fields extracted from one HTML document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    pub title: Option<String>,
    pub meta_description: Option<String>,

    /// Absolute HTTP(S) links in document order, without duplicates
    pub links: Vec<String>,
}

/// Parses HTML content
///
/// Links are resolved against `base_url`. `javascript:`, `mailto:`, `tel:`
/// and `data:` hrefs, fragment-only anchors and `download` links are
/// dropped. Parsing is lenient and never fails; a document with no usable
/// content yields an empty `ParsedPage`.
///
/// # Example
///
/// ```
/// use crawl_ingest::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &base_url);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links, vec!["https://example.com/page".to_string()]);
/// ```
pub fn parse_html(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        title: extract_title(&document),
        meta_description: extract_meta_description(&document),
        links: extract_links(&document, base_url),
    }
}

fn extract_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;

    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_meta_description(document: &Html) -> Option<String> {
    let selector = Selector::parse("meta[name]").ok()?;

    document
        .select(&selector)
        .find(|element| {
            element
                .value()
                .attr("name")
                .map(|name| name.eq_ignore_ascii_case("description"))
                .unwrap_or(false)
        })
        .and_then(|element| element.value().attr("content"))
        .map(|content| content.trim().to_string())
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links = Vec::new();
    let mut seen = HashSet::new();

    let selector = match Selector::parse("a[href]") {
        Ok(selector) => selector,
        Err(_) => return links,
    };

    for element in document.select(&selector) {
        if element.value().attr("download").is_some() {
            continue;
        }

        if let Some(absolute_url) = element
            .value()
            .attr("href")
            .and_then(|href| resolve_link(href, base_url))
        {
            if seen.insert(absolute_url.clone()) {
                links.push(absolute_url);
            }
        }
    }

    links
}

/// Resolves an href to an absolute HTTP(S) URL, or `None` if it should be skipped
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let mut absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() != "http" && absolute_url.scheme() != "https" {
        return None;
    }
    absolute_url.set_fragment(None);

    Some(absolute_url.to_string())
}
