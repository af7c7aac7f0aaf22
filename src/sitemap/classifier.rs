//! Page-type heuristics for sitemap URLs
//!
//! Both rule lists are ordered: the first matching rule wins, and more
//! specific categories come before general ones.

use percent_encoding::percent_decode_str;
use scraper::{Html, Selector};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Category inferred for a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageType {
    Home,
    Product,
    Category,
    Service,
    Blog,
    About,
    Contact,
    Pricing,
    Legal,
    /// Content was fetched and is HTML, but nothing more specific matched
    Page,
    /// Nothing matched and no content was available
    Other,
}

impl PageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::Home => "home",
            PageType::Product => "product",
            PageType::Category => "category",
            PageType::Service => "service",
            PageType::Blog => "blog",
            PageType::About => "about",
            PageType::Contact => "contact",
            PageType::Pricing => "pricing",
            PageType::Legal => "legal",
            PageType::Page => "page",
            PageType::Other => "other",
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "home" => Ok(PageType::Home),
            "product" => Ok(PageType::Product),
            "category" => Ok(PageType::Category),
            "service" => Ok(PageType::Service),
            "blog" => Ok(PageType::Blog),
            "about" => Ok(PageType::About),
            "contact" => Ok(PageType::Contact),
            "pricing" => Ok(PageType::Pricing),
            "legal" => Ok(PageType::Legal),
            "page" => Ok(PageType::Page),
            "other" => Ok(PageType::Other),
            other => Err(format!("Unknown page type: {}", other)),
        }
    }
}

/// Path-segment rule: matches when any segment starts with one of `prefixes`
struct UrlRule {
    name: &'static str,
    prefixes: &'static [&'static str],
    page_type: PageType,
}

const URL_RULES: &[UrlRule] = &[
    UrlRule {
        name: "product",
        prefixes: &["product", "shop", "item", "محصول"],
        page_type: PageType::Product,
    },
    UrlRule {
        name: "category",
        prefixes: &["category", "categories", "collection", "دسته"],
        page_type: PageType::Category,
    },
    UrlRule {
        name: "pricing",
        prefixes: &["pricing", "plans"],
        page_type: PageType::Pricing,
    },
    UrlRule {
        name: "service",
        prefixes: &["service", "خدمات"],
        page_type: PageType::Service,
    },
    UrlRule {
        name: "blog",
        prefixes: &["blog", "post", "article", "news"],
        page_type: PageType::Blog,
    },
    UrlRule {
        name: "about",
        prefixes: &["about", "درباره"],
        page_type: PageType::About,
    },
    UrlRule {
        name: "contact",
        prefixes: &["contact", "تماس"],
        page_type: PageType::Contact,
    },
    UrlRule {
        name: "legal",
        prefixes: &["privacy", "terms", "legal", "cookie"],
        page_type: PageType::Legal,
    },
];

/// Markup rule: matches when `selector` selects an element whose text
/// contains `text` (or any element at all when `text` is `None`)
struct ContentRule {
    signal: &'static str,
    selector: &'static str,
    text: Option<&'static str>,
    page_type: PageType,
}

const CONTENT_RULES: &[ContentRule] = &[
    ContentRule {
        signal: "schema-product",
        selector: r#"[itemtype*="schema.org/Product"]"#,
        text: None,
        page_type: PageType::Product,
    },
    ContentRule {
        signal: "json-ld-product",
        selector: r#"script[type="application/ld+json"]"#,
        text: Some(r#""Product""#),
        page_type: PageType::Product,
    },
    ContentRule {
        signal: "itemprop-price",
        selector: r#"[itemprop="price"]"#,
        text: None,
        page_type: PageType::Product,
    },
    ContentRule {
        signal: "pricing-table",
        selector: r#"[class*="pricing"]"#,
        text: None,
        page_type: PageType::Pricing,
    },
    ContentRule {
        signal: "article-published-time",
        selector: r#"meta[property="article:published_time"]"#,
        text: None,
        page_type: PageType::Blog,
    },
    ContentRule {
        signal: "time-datetime",
        selector: "time[datetime]",
        text: None,
        page_type: PageType::Blog,
    },
    ContentRule {
        signal: "article",
        selector: "article",
        text: None,
        page_type: PageType::Blog,
    },
    ContentRule {
        signal: "price-class",
        selector: r#"[class*="price"]"#,
        text: None,
        page_type: PageType::Product,
    },
];

/// Classifies a URL by its path alone
///
/// Returns the page type and the name of the rule that matched, or `None`
/// when the path is inconclusive.
pub fn classify_url(url: &Url) -> Option<(PageType, &'static str)> {
    let path = percent_decode_str(url.path())
        .decode_utf8_lossy()
        .to_lowercase();

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Some((PageType::Home, "home"));
    }

    URL_RULES
        .iter()
        .find(|rule| {
            segments
                .iter()
                .any(|segment| rule.prefixes.iter().any(|p| segment.starts_with(p)))
        })
        .map(|rule| (rule.page_type, rule.name))
}

/// Classifies a page by its HTML markup
///
/// Returns the page type and the signal that matched, or `None` if no
/// content rule applies.
pub fn classify_content(html: &str) -> Option<(PageType, &'static str)> {
    let document = Html::parse_document(html);

    CONTENT_RULES
        .iter()
        .find(|rule| {
            let Ok(selector) = Selector::parse(rule.selector) else {
                tracing::warn!(selector = rule.selector, "Invalid content rule selector");
                return false;
            };

            document.select(&selector).any(|element| match rule.text {
                None => true,
                Some(needle) => element.text().collect::<String>().contains(needle),
            })
        })
        .map(|rule| (rule.page_type, rule.signal))
}
