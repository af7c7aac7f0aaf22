use serde::Deserialize;

/// Main configuration structure for Crawl Lab
///
/// Every section is optional in the TOML file; missing sections and keys
/// fall back to the defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    pub sitemap: SitemapConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Default page budget when a crawl request does not specify one
    #[serde(rename = "max-pages")]
    pub max_pages: u32,

    /// Default minimum time between requests (milliseconds)
    #[serde(rename = "delay-ms")]
    pub delay_ms: u64,

    /// Per-request timeout (milliseconds)
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Maximum link depth from the root; unlimited when absent
    #[serde(rename = "max-depth")]
    pub max_depth: Option<u32>,

    /// Whether subdomains of the target count as internal
    #[serde(rename = "include-subdomains")]
    pub include_subdomains: bool,

    /// Seed each job's frontier with the URLs listed in the site's sitemaps
    #[serde(rename = "use-sitemap")]
    pub use_sitemap: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: 500,
            delay_ms: 1000,
            timeout_ms: 30_000,
            max_depth: None,
            include_subdomains: false,
            use_sitemap: true,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler; also the token matched against robots.txt groups
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "CrawlLab".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://crawl-lab.invalid/bot".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "./crawl-lab.db".to_string(),
        }
    }
}

/// Sitemap classifier limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SitemapConfig {
    /// Maximum number of classified URLs returned
    #[serde(rename = "max-pages")]
    pub max_pages: u32,

    /// Maximum sitemap-index nesting followed
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Delay between content fetches (milliseconds)
    #[serde(rename = "delay-ms")]
    pub delay_ms: u64,
}

impl Default for SitemapConfig {
    fn default() -> Self {
        Self {
            max_pages: 50,
            max_depth: 3,
            delay_ms: 200,
        }
    }
}
