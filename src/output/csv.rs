//! CSV export of crawled pages

use crate::storage::PageRecord;
use std::str::FromStr;

pub const CSV_HEADER: &str = "URL,Status,Title,Load Time (ms),Word Count,Crawled At";

/// Status-code filter for exports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Ok,
    NotFound,
    /// Any status >= 400
    Error,
    Redirect,
}

impl StatusFilter {
    pub fn matches(&self, status_code: u16) -> bool {
        match self {
            StatusFilter::Ok => status_code == 200,
            StatusFilter::NotFound => status_code == 404,
            StatusFilter::Error => status_code >= 400,
            StatusFilter::Redirect => (300..400).contains(&status_code),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "200" => Ok(StatusFilter::Ok),
            "404" => Ok(StatusFilter::NotFound),
            "error" => Ok(StatusFilter::Error),
            "3xx" => Ok(StatusFilter::Redirect),
            other => Err(format!(
                "Unknown status filter '{}' (expected 200, 404, error or 3xx)",
                other
            )),
        }
    }
}

/// URL-shape filter for exports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlTypeFilter {
    Product,
    Blog,
    Category,
}

impl UrlTypeFilter {
    fn needles(&self) -> &'static [&'static str] {
        match self {
            UrlTypeFilter::Product => &["/product"],
            UrlTypeFilter::Blog => &["/blog", "/post", "/article", "/news"],
            UrlTypeFilter::Category => &["/category", "/collection"],
        }
    }

    pub fn matches(&self, url: &str) -> bool {
        let url = url.to_lowercase();
        self.needles().iter().any(|needle| url.contains(needle))
    }
}

impl FromStr for UrlTypeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "product" => Ok(UrlTypeFilter::Product),
            "blog" => Ok(UrlTypeFilter::Blog),
            "category" => Ok(UrlTypeFilter::Category),
            other => Err(format!(
                "Unknown URL type '{}' (expected product, blog or category)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExportFilters {
    pub status: Option<StatusFilter>,
    pub url_type: Option<UrlTypeFilter>,
}

impl ExportFilters {
    pub fn matches(&self, page: &PageRecord) -> bool {
        self.status.map_or(true, |f| f.matches(page.status_code))
            && self.url_type.map_or(true, |f| f.matches(&page.url))
    }
}

/// Quotes a field if it contains a comma, quote or line break
fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn optional_number(value: u64) -> String {
    if value == 0 {
        String::new()
    } else {
        value.to_string()
    }
}

/// Renders matching pages as CSV, most recently crawled first
pub fn export_csv(pages: &[PageRecord], filters: &ExportFilters) -> String {
    let mut csv = String::from(CSV_HEADER);
    csv.push('\n');

    for page in pages.iter().rev().filter(|p| filters.matches(p)) {
        let row = [
            escape_field(&page.url),
            page.status_code.to_string(),
            escape_field(page.title.as_deref().unwrap_or("")),
            optional_number(page.load_time_ms),
            optional_number(u64::from(page.word_count)),
            escape_field(&page.crawled_at),
        ];
        csv.push_str(&row.join(","));
        csv.push('\n');
    }

    csv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str, status: u16, title: Option<&str>) -> PageRecord {
        PageRecord {
            id: 0,
            job_id: 1,
            url: url.to_string(),
            final_url: None,
            status_code: status,
            title: title.map(str::to_string),
            meta_description: None,
            h1: None,
            content_type: None,
            word_count: 42,
            content_length: 0,
            load_time_ms: 120,
            depth: 0,
            error_message: None,
            crawled_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_header_and_quoting() {
        let pages = vec![page("https://example.com/", 200, Some(r#"Say "hi", world"#))];
        let csv = export_csv(&pages, &ExportFilters::default());
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[1],
            r#"https://example.com/,200,"Say ""hi"", world",120,42,2024-01-01T00:00:00Z"#
        );
    }

    #[test]
    fn test_missing_values_are_empty() {
        let mut p = page("https://example.com/x", 0, None);
        p.word_count = 0;
        p.load_time_ms = 0;
        let csv = export_csv(&[p], &ExportFilters::default());
        assert!(csv.ends_with("https://example.com/x,0,,,,2024-01-01T00:00:00Z\n"));
    }

    #[test]
    fn test_status_filters() {
        assert!(StatusFilter::Ok.matches(200));
        assert!(!StatusFilter::Ok.matches(201));
        assert!(StatusFilter::Error.matches(404));
        assert!(StatusFilter::Error.matches(503));
        assert!(StatusFilter::Redirect.matches(301));
        assert!(!StatusFilter::Redirect.matches(200));
        assert_eq!("3XX".parse::<StatusFilter>().unwrap(), StatusFilter::Redirect);
        assert!("500".parse::<StatusFilter>().is_err());
    }

    #[test]
    fn test_url_type_filter_and_order() {
        let pages = vec![
            page("https://example.com/Blog/first", 200, None),
            page("https://example.com/products/shoe", 200, None),
            page("https://example.com/news/second", 200, None),
        ];
        let filters = ExportFilters {
            status: None,
            url_type: Some(UrlTypeFilter::Blog),
        };
        let csv = export_csv(&pages, &filters);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("https://example.com/news/second"));
        assert!(lines[2].starts_with("https://example.com/Blog/first"));
    }
}
