//! Boundary operations of the crawl engine
//!
//! `CrawlService` is what the excluded HTTP and UI layers (and the CLI) talk
//! to. Starting a crawl only creates the job row and spawns its task; all
//! progress is communicated through storage.

use crate::config::{validate_crawl_limits, Config};
use crate::crawler::coordinator::{Coordinator, JobSpec};
use crate::crawler::fetcher::build_http_client;
use crate::crawler::registry::JobRegistry;
use crate::output::{build_audit, export_csv, AuditReport, ExportFilters};
use crate::robots::{fetch_robots_txt, RobotsPolicy};
use crate::sitemap::{crawl_sitemap, SitemapPageResult};
use crate::state::{JobStatus, LogLevel};
use crate::storage::{
    open_storage, shared, with_storage, ImageRecord, ImageStats, JobCounts, JobRecord, JobSummary,
    LogRecord, NewJob, PageSummary, Pagination, SharedStorage,
};
use crate::url::normalize_url;
use crate::{CrawlLabError, Result};
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Default number of log entries returned by [`CrawlService::list_logs`]
pub const DEFAULT_LOG_LIMIT: u32 = 100;

/// Upper bound on log entries returned in one call
pub const MAX_LOG_LIMIT: u32 = 1000;

/// Per-request overrides for a crawl; unset values use the config defaults
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlOptions {
    pub max_pages: Option<u32>,
    pub delay_ms: Option<u64>,
}

/// A job row plus counters derived from its child rows
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub job: JobRecord,
    pub counts: JobCounts,
}

/// What a cancel request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job had already finished; nothing changed
    AlreadyTerminal(JobStatus),
    /// The flag was set; the job stops at its next iteration
    Requested,
    /// No task was running the job, so it was marked cancelled immediately
    CancelledDirectly,
}

/// Filter for [`CrawlService::list_logs`]
#[derive(Debug, Clone, Copy)]
pub struct LogQuery {
    pub level: Option<LogLevel>,
    pub limit: u32,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            level: None,
            limit: DEFAULT_LOG_LIMIT,
        }
    }
}

/// Entry point for starting, inspecting and tearing down crawl jobs
#[derive(Clone)]
pub struct CrawlService {
    storage: SharedStorage,
    client: Client,
    config: Arc<Config>,
    registry: Arc<JobRegistry>,
}

impl CrawlService {
    /// Opens the configured database and builds the HTTP client
    pub fn new(config: Config) -> Result<Self> {
        let storage = open_storage(Path::new(&config.output.database_path))?;
        Self::with_storage(config, shared(storage))
    }

    /// Builds a service over an existing storage handle
    pub fn with_storage(config: Config, storage: SharedStorage) -> Result<Self> {
        let client = build_http_client(
            &config.user_agent,
            Duration::from_millis(config.crawler.timeout_ms),
        )?;

        Ok(Self {
            storage,
            client,
            config: Arc::new(config),
            registry: Arc::new(JobRegistry::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    /// Number of jobs whose task is still running
    pub fn live_jobs(&self) -> usize {
        self.registry.live_count()
    }

    /// Validates the request, creates a `queued` job and spawns its task
    ///
    /// Returns as soon as the job row exists; must be called from within a
    /// tokio runtime.
    ///
    /// # Errors
    ///
    /// * `InvalidRequest` - malformed URL or limits out of range; no job is created
    /// * `Storage` - the job row could not be created
    pub fn start_crawl(&self, url: &str, options: CrawlOptions) -> Result<i64> {
        let root = parse_target(url)?;

        let max_pages = options.max_pages.unwrap_or(self.config.crawler.max_pages);
        let delay_ms = options.delay_ms.unwrap_or(self.config.crawler.delay_ms);
        validate_crawl_limits(max_pages, delay_ms)
            .map_err(|e| CrawlLabError::InvalidRequest(e.to_string()))?;

        let new_job = NewJob {
            url: root.to_string(),
            max_pages,
            delay_ms,
            timeout_ms: self.config.crawler.timeout_ms,
        };
        let job_id = with_storage(&self.storage, |s| s.create_job(&new_job))?;

        let spec = JobSpec {
            job_id,
            root,
            max_pages,
            delay: Duration::from_millis(delay_ms),
            max_depth: self.config.crawler.max_depth,
            include_subdomains: self.config.crawler.include_subdomains,
            use_sitemap: self.config.crawler.use_sitemap,
            sitemap_max_depth: self.config.sitemap.max_depth,
            agent: self.config.user_agent.crawler_name.clone(),
        };
        let storage = Arc::clone(&self.storage);
        let client = self.client.clone();
        let registry = Arc::clone(&self.registry);
        self.registry.start(job_id, move |cancel| {
            Coordinator::new(spec, storage, client, cancel, registry).spawn()
        });

        tracing::info!(job_id, url = %new_job.url, max_pages, delay_ms, "Crawl job started");
        Ok(job_id)
    }

    /// Returns the job row and its derived counters
    pub fn get_crawl_status(&self, job_id: i64) -> Result<JobSnapshot> {
        let job = self.require_job(job_id)?;
        let counts = with_storage(&self.storage, |s| s.job_counts(job_id))?;
        Ok(JobSnapshot { job, counts })
    }

    /// Requests cooperative cancellation
    ///
    /// Idempotent: a terminal job is reported as such and left untouched.
    pub fn cancel(&self, job_id: i64) -> Result<CancelOutcome> {
        let job = self.require_job(job_id)?;
        if job.status.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal(job.status));
        }

        if self.registry.request_cancel(job_id) {
            tracing::info!(job_id, "Cancellation requested");
            return Ok(CancelOutcome::Requested);
        }

        // No task owns this job (e.g. the process that started it exited)
        let changed = with_storage(&self.storage, |s| {
            let changed = s.update_job_status(job_id, JobStatus::Cancelled, None)?;
            if changed {
                s.append_log(job_id, LogLevel::Warn, "Crawl cancelled by user")?;
            }
            Ok(changed)
        })?;

        if changed {
            tracing::info!(job_id, "Orphaned job marked cancelled");
            Ok(CancelOutcome::CancelledDirectly)
        } else {
            let status = self.require_job(job_id)?.status;
            Ok(CancelOutcome::AlreadyTerminal(status))
        }
    }

    /// Lists log entries, most recent first
    pub fn list_logs(&self, job_id: i64, query: LogQuery) -> Result<Vec<LogRecord>> {
        if !(1..=MAX_LOG_LIMIT).contains(&query.limit) {
            return Err(CrawlLabError::InvalidRequest(format!(
                "limit must be between 1 and {}",
                MAX_LOG_LIMIT
            )));
        }

        self.require_job(job_id)?;
        Ok(with_storage(&self.storage, |s| {
            s.list_logs(job_id, query.level, query.limit)
        })?)
    }

    /// Tears down a job and everything it owns
    ///
    /// A running job is cancelled first and its task awaited, so the loop can
    /// never write rows for a job that is being deleted.
    pub async fn delete_job(&self, job_id: i64) -> Result<()> {
        self.require_job(job_id)?;

        if let Some(task) = self.registry.cancel_and_take(job_id) {
            tracing::info!(job_id, "Stopping running job before delete");
            if let Err(e) = task.await {
                tracing::warn!(job_id, error = %e, "Crawl task ended abnormally");
            }
        }

        if with_storage(&self.storage, |s| s.delete_job(job_id))? {
            tracing::info!(job_id, "Crawl job deleted");
            Ok(())
        } else {
            Err(CrawlLabError::JobNotFound(job_id))
        }
    }

    /// Most recent jobs first, with their row counts
    pub fn list_jobs(&self, limit: u32) -> Result<Vec<JobSummary>> {
        Ok(with_storage(&self.storage, |s| s.list_jobs(limit.max(1)))?)
    }

    /// One window of a job's pages plus the total page count
    pub fn list_pages(&self, job_id: i64, window: Pagination) -> Result<(Vec<PageSummary>, u64)> {
        self.require_job(job_id)?;
        Ok(with_storage(&self.storage, |s| {
            Ok((s.list_pages(job_id, window)?, s.count_pages(job_id)?))
        })?)
    }

    /// One window of a job's images plus image totals
    pub fn list_images(
        &self,
        job_id: i64,
        missing_alt_only: bool,
        window: Pagination,
    ) -> Result<(Vec<ImageRecord>, ImageStats)> {
        self.require_job(job_id)?;
        Ok(with_storage(&self.storage, |s| {
            Ok((
                s.get_images(job_id, missing_alt_only, Some(window))?,
                s.image_stats(job_id)?,
            ))
        })?)
    }

    /// SEO audit over everything the job recorded
    pub fn audit(&self, job_id: i64) -> Result<AuditReport> {
        let job = self.require_job(job_id)?;
        let (pages, links, images) = with_storage(&self.storage, |s| {
            Ok((
                s.get_pages(job_id)?,
                s.get_links(job_id)?,
                s.get_images(job_id, false, None)?,
            ))
        })?;

        Ok(build_audit(&job, &pages, &links, &images))
    }

    /// Renders the job's pages as CSV
    pub fn export_csv(&self, job_id: i64, filters: &ExportFilters) -> Result<String> {
        self.require_job(job_id)?;
        let pages = with_storage(&self.storage, |s| s.get_pages(job_id))?;
        Ok(export_csv(&pages, filters))
    }

    /// Classifies the pages advertised by a site's sitemaps
    pub async fn crawl_sitemap(&self, site_url: &str) -> Result<Vec<SitemapPageResult>> {
        let site = parse_target(site_url)?;
        Ok(crawl_sitemap(
            &self.client,
            &site,
            &self.config.user_agent.crawler_name,
            &self.config.sitemap,
        )
        .await)
    }

    /// Fetches and parses robots.txt for inspection
    pub async fn fetch_robots_txt(&self, site_url: &str) -> Result<RobotsPolicy> {
        let site = parse_target(site_url)?;
        Ok(fetch_robots_txt(&self.client, &site, &self.config.user_agent.crawler_name).await)
    }

    fn require_job(&self, job_id: i64) -> Result<JobRecord> {
        with_storage(&self.storage, |s| s.get_job(job_id))?
            .ok_or(CrawlLabError::JobNotFound(job_id))
    }
}

/// Parses a caller-supplied target, assuming `https://` when no scheme is given
fn parse_target(input: &str) -> Result<Url> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CrawlLabError::InvalidRequest("URL is required".to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    normalize_url(&candidate)
        .map_err(|e| CrawlLabError::InvalidRequest(format!("Invalid URL '{}': {}", trimmed, e)))
}
