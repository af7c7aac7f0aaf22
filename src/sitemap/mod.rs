//! Sitemap-driven page classification
//!
//! Walks a site's sitemaps (expanding sitemap indexes up to a bounded
//! depth), collects the advertised page URLs in discovery order and assigns
//! each a [`PageType`]. This is an interactive operation: the number of
//! classified pages and sitemap documents is capped, and every request goes
//! through one [`FetchThrottle`].
//!
//! Crawl jobs reuse [`SitemapWalker`] to seed their frontier.

mod classifier;
mod parser;

pub use classifier::{classify_content, classify_url, PageType};
pub use parser::{parse_sitemap, SitemapDocument, SitemapError, SitemapKind};

use crate::config::SitemapConfig;
use crate::crawler::{FetchThrottle, PageFetcher};
use crate::crawler::FetchErrorKind;
use crate::robots::{fetch_robots_txt, RobotsPolicy};
use crate::state::LogLevel;
use crate::url::{normalize_parsed, origin_root};
use reqwest::Client;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use url::Url;

/// Well-known sitemap locations tried when robots.txt advertises none
pub const CANDIDATE_PATHS: &[&str] = &["/sitemap.xml", "/sitemap_index.xml", "/wp-sitemap.xml"];

/// Maximum number of sitemap documents fetched in one walk
pub const MAX_SITEMAP_DOCUMENTS: u32 = 25;

/// Path fragments of URLs that are never classified
const EXCLUDED_PATHS: &[&str] = &["/wp-content/", "/wp-admin/"];

/// One classified sitemap URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapPageResult {
    pub url: String,
    pub page_type: PageType,
    /// What decided the type: `url:<rule>` or `content:<signal>`
    pub signal: Option<String>,
}

/// Something a sitemap walk wants recorded in its caller's log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapNote {
    pub level: LogLevel,
    pub message: String,
}

/// Discovers and classifies the pages listed in a site's sitemaps
///
/// # Arguments
///
/// * `client` - The shared HTTP client
/// * `site` - Any URL on the site; sitemaps are looked up at its origin
/// * `agent` - Product token for robots.txt matching
/// * `config` - Page cap, index depth bound and pacing
///
/// # Returns
///
/// Results in sitemap discovery order, at most `config.max_pages` entries.
/// A site without a usable sitemap yields an empty list.
pub async fn crawl_sitemap(
    client: &Client,
    site: &Url,
    agent: &str,
    config: &SitemapConfig,
) -> Vec<SitemapPageResult> {
    let robots = fetch_robots_txt(client, site, agent).await;
    // Only content fetches are charged; documents are bounded separately
    let mut throttle = FetchThrottle::new(Duration::from_millis(config.delay_ms), config.max_pages)
        .with_crawl_delay(robots.crawl_delay());

    let mut walker = SitemapWalker::new(
        PageFetcher::new(client, &robots),
        config.max_pages as usize,
        config.max_depth,
    );

    let urls = walker.discover(site, &robots, &mut throttle).await;
    for note in walker.take_notes() {
        match note.level {
            LogLevel::Info => tracing::info!(site = %site, "{}", note.message),
            LogLevel::Warn => tracing::warn!(site = %site, "{}", note.message),
            LogLevel::Error => tracing::error!(site = %site, "{}", note.message),
        }
    }
    tracing::info!(site = %site, urls = urls.len(), "Sitemap URLs discovered");

    let mut results = Vec::with_capacity(urls.len());
    for url in urls {
        results.push(walker.classify(url, &mut throttle).await);
    }
    results
}

/// Bounded walk over a site's sitemap documents
pub struct SitemapWalker<'a> {
    fetcher: PageFetcher<'a>,
    max_urls: usize,
    max_depth: u32,
    seen_documents: HashSet<String>,
    notes: Vec<SitemapNote>,
}

impl<'a> SitemapWalker<'a> {
    /// # Arguments
    ///
    /// * `fetcher` - Fetcher bound to the site's robots policy
    /// * `max_urls` - Page URLs collected before the walk stops
    /// * `max_depth` - Sitemap-index nesting followed
    pub fn new(fetcher: PageFetcher<'a>, max_urls: usize, max_depth: u32) -> Self {
        Self {
            fetcher,
            max_urls,
            max_depth,
            seen_documents: HashSet::new(),
            notes: Vec::new(),
        }
    }

    /// Collects page URLs from the advertised sitemaps, or from the first
    /// well-known location that lists any
    ///
    /// Document fetches wait on `throttle` but are not charged against it.
    pub async fn discover(
        &mut self,
        site: &Url,
        robots: &RobotsPolicy,
        throttle: &mut FetchThrottle,
    ) -> Vec<Url> {
        let advertised: Vec<Url> = robots
            .sitemaps()
            .iter()
            .filter_map(|s| Url::parse(s).ok())
            .collect();

        if !advertised.is_empty() {
            tracing::debug!(count = advertised.len(), "Using sitemaps from robots.txt");
            return self.walk(advertised, throttle).await;
        }

        let root = origin_root(site);
        for path in CANDIDATE_PATHS {
            let Ok(candidate) = root.join(path) else {
                continue;
            };
            let urls = self.walk(vec![candidate], throttle).await;
            if !urls.is_empty() {
                return urls;
            }
        }

        Vec::new()
    }

    /// Number of sitemap documents requested so far
    pub fn documents_fetched(&self) -> usize {
        self.seen_documents.len()
    }

    /// Drains the notes recorded since the last call
    pub fn take_notes(&mut self) -> Vec<SitemapNote> {
        std::mem::take(&mut self.notes)
    }

    fn note(&mut self, level: LogLevel, message: String) {
        tracing::debug!("sitemap {}: {}", level, message);
        self.notes.push(SitemapNote { level, message });
    }

    /// Breadth-first expansion of sitemap indexes, deduplicating page URLs
    ///
    /// Documents are deduplicated across the whole walk, so an index that
    /// lists itself (or a cycle of indexes) is fetched once.
    async fn walk(&mut self, seeds: Vec<Url>, throttle: &mut FetchThrottle) -> Vec<Url> {
        let mut queue: VecDeque<(Url, u32)> = seeds.into_iter().map(|u| (u, 0)).collect();
        let mut seen_pages = HashSet::new();
        let mut pages = Vec::new();

        while let Some((sitemap_url, depth)) = queue.pop_front() {
            if pages.len() >= self.max_urls {
                break;
            }
            if self.seen_documents.contains(sitemap_url.as_str()) {
                continue;
            }
            if self.documents_fetched() >= MAX_SITEMAP_DOCUMENTS as usize {
                self.note(
                    LogLevel::Warn,
                    format!("Sitemap document limit of {} reached", MAX_SITEMAP_DOCUMENTS),
                );
                break;
            }
            self.seen_documents.insert(sitemap_url.as_str().to_string());

            self.note(LogLevel::Info, format!("Fetching sitemap: {}", sitemap_url));
            let body = match self.fetcher.get(&sitemap_url, throttle).await {
                Ok(raw) => raw.body,
                Err(e) => {
                    let message = match (e.kind, e.status_code) {
                        (FetchErrorKind::HttpStatus, Some(code)) => {
                            format!("Sitemap returned {}: {}", code, sitemap_url)
                        }
                        _ => format!("Failed to fetch sitemap {}: {}", sitemap_url, e),
                    };
                    self.note(LogLevel::Warn, message);
                    continue;
                }
            };

            let document = match parse_sitemap(&body) {
                Ok(document) => document,
                Err(e) => {
                    self.note(
                        LogLevel::Warn,
                        format!("Skipping unreadable sitemap {}: {}", sitemap_url, e),
                    );
                    continue;
                }
            };

            match document.kind {
                SitemapKind::Index => {
                    self.note(
                        LogLevel::Info,
                        format!(
                            "Found sitemap index with {} sitemaps",
                            document.locations.len()
                        ),
                    );
                    if depth >= self.max_depth {
                        self.note(
                            LogLevel::Warn,
                            format!("Sitemap index nesting limit reached at {}", sitemap_url),
                        );
                        continue;
                    }
                    for loc in document.locations {
                        if let Ok(child) = Url::parse(&loc) {
                            queue.push_back((child, depth + 1));
                        }
                    }
                }
                SitemapKind::UrlSet => {
                    self.note(
                        LogLevel::Info,
                        format!("Found {} URLs in sitemap", document.locations.len()),
                    );
                    for loc in document.locations {
                        if pages.len() >= self.max_urls {
                            break;
                        }
                        if EXCLUDED_PATHS.iter().any(|p| loc.contains(p)) {
                            continue;
                        }
                        let Some(url) = Url::parse(&loc)
                            .ok()
                            .and_then(|u| normalize_parsed(u).ok())
                        else {
                            continue;
                        };
                        if seen_pages.insert(url.as_str().to_string()) {
                            pages.push(url);
                        }
                    }
                }
            }
        }

        pages
    }

    /// Classifies one URL, fetching its content only when the path is inconclusive
    async fn classify(&mut self, url: Url, throttle: &mut FetchThrottle) -> SitemapPageResult {
        if let Some((page_type, rule)) = classify_url(&url) {
            return SitemapPageResult {
                url: url.to_string(),
                page_type,
                signal: Some(format!("url:{}", rule)),
            };
        }

        let (page_type, signal) = self.classify_by_content(&url, throttle).await;
        SitemapPageResult {
            url: url.to_string(),
            page_type,
            signal,
        }
    }

    async fn classify_by_content(
        &mut self,
        url: &Url,
        throttle: &mut FetchThrottle,
    ) -> (PageType, Option<String>) {
        if !self.fetcher.is_allowed(url) || throttle.is_exhausted() {
            return (PageType::Other, None);
        }

        match self.fetcher.get_page(url, throttle).await {
            Ok(raw) if raw.is_html() => match classify_content(&raw.body) {
                Some((page_type, signal)) => (page_type, Some(format!("content:{}", signal))),
                None => (PageType::Page, None),
            },
            Ok(_) => (PageType::Other, None),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Content fetch failed during classification");
                (PageType::Other, None)
            }
        }
    }
}
