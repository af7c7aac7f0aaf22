//! HTML parser for extracting links, images and page metadata
//!
//! This module handles parsing HTML content to extract:
//! - Links (`<a href>`) with their anchor text
//! - Images (`<img src>`) with their alt text
//! - Title, meta description and first `<h1>`
//! - A visible-text word count

use crate::url::normalize_parsed;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashSet;
use url::Url;

/// Elements whose text never counts as page content
const NON_CONTENT_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// A link found on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    /// Absolute, normalized target URL
    pub url: Url,
    /// Trimmed anchor text, `None` when empty
    pub anchor_text: Option<String>,
}

/// An image found on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedImage {
    /// Absolute image URL
    pub url: String,
    /// Alt text as written; `None` when the attribute is absent
    pub alt: Option<String>,
}

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub h1: Option<String>,
    pub links: Vec<ExtractedLink>,
    pub images: Vec<ExtractedImage>,
    pub word_count: u32,
}

/// Parses HTML content and extracts links, images and metadata
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` anywhere in the document, resolved against `<base href>`
///   when present, otherwise against the page URL
///
/// **Exclude:**
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs and fragment-only hrefs
/// - Anything that does not resolve to an HTTP(S) URL
///
/// Each target is kept once per page (first anchor text wins).
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `page_url` - The URL the content was served from (after redirects)
///
/// # Example
///
/// ```
/// use crawl_lab::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let page_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &page_url);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links[0].url.as_str(), "https://example.com/page");
/// ```
pub fn parse_html(html: &str, page_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);
    let base_url = extract_base_url(&document, page_url);

    ParsedPage {
        title: first_text(&document, "title"),
        meta_description: extract_meta_description(&document),
        h1: first_text(&document, "h1"),
        links: extract_links(&document, &base_url),
        images: extract_images(&document, &base_url),
        word_count: count_words(&document),
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Collapses runs of whitespace into single spaces and trims the ends
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = collapse_whitespace(&element.text().collect::<String>());
    (!text.is_empty()).then_some(text)
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let selector = selector(css)?;
    document.select(&selector).next().and_then(element_text)
}

fn extract_base_url(document: &Html, page_url: &Url) -> Url {
    selector("base[href]")
        .and_then(|sel| {
            document
                .select(&sel)
                .next()
                .and_then(|el| el.value().attr("href"))
                .and_then(|href| page_url.join(href.trim()).ok())
        })
        .unwrap_or_else(|| page_url.clone())
}

fn extract_meta_description(document: &Html) -> Option<String> {
    let selector = selector("meta[name][content]")?;
    document
        .select(&selector)
        .find(|el| {
            el.value()
                .attr("name")
                .is_some_and(|name| name.eq_ignore_ascii_case("description"))
        })
        .and_then(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .filter(|s| !s.is_empty())
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<ExtractedLink> {
    let Some(a_selector) = selector("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&a_selector) {
        let Some(url) = element
            .value()
            .attr("href")
            .and_then(|href| resolve_link(href, base_url))
        else {
            continue;
        };

        if seen.insert(url.as_str().to_string()) {
            links.push(ExtractedLink {
                url,
                anchor_text: element_text(element),
            });
        }
    }

    links
}

fn extract_images(document: &Html, base_url: &Url) -> Vec<ExtractedImage> {
    let Some(img_selector) = selector("img[src]") else {
        return Vec::new();
    };

    document
        .select(&img_selector)
        .filter_map(|element| {
            let src = element.value().attr("src")?.trim();
            if src.is_empty() || src.starts_with("data:") {
                return None;
            }
            let url = base_url.join(src).ok()?;
            Some(ExtractedImage {
                url: url.to_string(),
                alt: element.value().attr("alt").map(|alt| alt.trim().to_string()),
            })
        })
        .collect()
}

/// Counts whitespace-separated words of visible text
fn count_words(document: &Html) -> u32 {
    let root = selector("body")
        .and_then(|sel| document.select(&sel).next())
        .unwrap_or_else(|| document.root_element());

    let mut words = 0usize;
    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| NON_CONTENT_ELEMENTS.contains(&el.name()))
        });

        if !hidden {
            words += text.split_whitespace().count();
        }
    }

    u32::try_from(words).unwrap_or(u32::MAX)
}

/// Resolves a link href to an absolute, normalized HTTP(S) URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only hrefs
/// - Invalid URLs or non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
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

    let absolute = base_url.join(href).ok()?;
    normalize_parsed(absolute).ok()
}
