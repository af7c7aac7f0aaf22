//! Streaming sitemap XML parser
//!
//! Handles both `<urlset>` documents and `<sitemapindex>` documents. Only the
//! `<loc>` values are extracted; `lastmod`, `priority` and friends are ignored.

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Errors raised while reading a sitemap document
#[derive(Debug, Error)]
pub enum SitemapError {
    #[error("Malformed sitemap XML: {0}")]
    Xml(String),

    #[error("Not a sitemap: root element is <{0}>")]
    UnexpectedRoot(String),

    #[error("Empty sitemap document")]
    Empty,
}

/// What a sitemap document lists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitemapKind {
    /// `<urlset>`: page URLs
    UrlSet,
    /// `<sitemapindex>`: URLs of further sitemaps
    Index,
}

/// A parsed sitemap document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapDocument {
    pub kind: SitemapKind,
    /// `<loc>` values in document order
    pub locations: Vec<String>,
}

/// Parses a sitemap or sitemap index
///
/// # Example
///
/// ```
/// use crawl_lab::sitemap::{parse_sitemap, SitemapKind};
///
/// let doc = parse_sitemap(
///     "<urlset><url><loc>https://example.com/</loc></url></urlset>",
/// ).unwrap();
/// assert_eq!(doc.kind, SitemapKind::UrlSet);
/// assert_eq!(doc.locations, vec!["https://example.com/"]);
/// ```
pub fn parse_sitemap(xml: &str) -> Result<SitemapDocument, SitemapError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut kind = None;
    let mut locations = Vec::new();
    let mut in_loc = false;
    let mut current = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase();
                if kind.is_none() {
                    kind = Some(match name.as_str() {
                        "urlset" => SitemapKind::UrlSet,
                        "sitemapindex" => SitemapKind::Index,
                        _ => return Err(SitemapError::UnexpectedRoot(name)),
                    });
                } else if name == "loc" {
                    in_loc = true;
                    current.clear();
                }
            }
            Ok(Event::Text(ref e)) if in_loc => {
                let text = e
                    .unescape()
                    .map_err(|err| SitemapError::Xml(err.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::CData(e)) if in_loc => {
                current.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::End(ref e)) => {
                if in_loc && e.local_name().as_ref().eq_ignore_ascii_case(b"loc") {
                    in_loc = false;
                    let loc = current.trim();
                    if !loc.is_empty() {
                        locations.push(loc.to_string());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SitemapError::Xml(format!(
                    "{} at position {}",
                    e,
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    match kind {
        Some(kind) => Ok(SitemapDocument { kind, locations }),
        None => Err(SitemapError::Empty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_urlset() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url>
    <loc>https://example.com/</loc>
    <lastmod>2024-01-01</lastmod>
  </url>
  <url>
    <loc> https://example.com/blog/post?a=1&amp;b=2 </loc>
  </url>
</urlset>"#;

        let doc = parse_sitemap(xml).unwrap();
        assert_eq!(doc.kind, SitemapKind::UrlSet);
        assert_eq!(
            doc.locations,
            vec![
                "https://example.com/".to_string(),
                "https://example.com/blog/post?a=1&b=2".to_string(),
            ]
        );
    }

    #[test]
    fn test_parse_index() {
        let xml = r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://example.com/post-sitemap.xml</loc></sitemap>
  <sitemap><loc>https://example.com/page-sitemap.xml</loc></sitemap>
</sitemapindex>"#;

        let doc = parse_sitemap(xml).unwrap();
        assert_eq!(doc.kind, SitemapKind::Index);
        assert_eq!(doc.locations.len(), 2);
        assert_eq!(doc.locations[1], "https://example.com/page-sitemap.xml");
    }

    #[test]
    fn test_cdata_loc() {
        let xml = "<urlset><url><loc><![CDATA[https://example.com/a]]></loc></url></urlset>";
        let doc = parse_sitemap(xml).unwrap();
        assert_eq!(doc.locations, vec!["https://example.com/a".to_string()]);
    }

    #[test]
    fn test_prefixed_namespace() {
        let xml = r#"<sm:urlset xmlns:sm="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sm:url><sm:loc>https://example.com/x</sm:loc></sm:url>
</sm:urlset>"#;
        let doc = parse_sitemap(xml).unwrap();
        assert_eq!(doc.kind, SitemapKind::UrlSet);
        assert_eq!(doc.locations, vec!["https://example.com/x".to_string()]);
    }

    #[test]
    fn test_rejects_html() {
        let result = parse_sitemap("<html><body>Not found</body></html>");
        assert!(matches!(result, Err(SitemapError::UnexpectedRoot(ref root)) if root == "html"));
    }

    #[test]
    fn test_empty_document() {
        assert!(matches!(parse_sitemap(""), Err(SitemapError::Empty)));
    }
}
