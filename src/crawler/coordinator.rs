//! Crawler coordinator - the per-job crawl loop
//!
//! One `Coordinator` drives one job from `queued` to a terminal status:
//! - Fetching robots.txt and sizing the throttle
//! - Seeding the frontier from the site's sitemaps
//! - Draining the frontier breadth-first within the page budget
//! - Persisting pages, links, images and log lines
//! - Observing the cancellation flag between pages
//!
//! The job runs under a supervisor task, so a panic still ends in `failed`.

use crate::crawler::fetcher::{FetchError, FetchErrorKind, FetchOutcome, PageFetcher, PageResult};
use crate::crawler::frontier::{EnqueueOutcome, Frontier, QueuedUrl};
use crate::crawler::registry::{CancelFlag, JobRegistry};
use crate::crawler::throttle::FetchThrottle;
use crate::robots::{fetch_robots_txt, RobotsPolicy};
use crate::sitemap::SitemapWalker;
use crate::state::{JobStatus, LogLevel};
use crate::storage::{with_storage, JobProgress, NewImage, NewLink, NewPage, SharedStorage};
use crate::url::{extract_domain, SiteScope};
use crate::CrawlLabError;
use reqwest::Client;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

/// Everything a job needs to know about what to crawl
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_id: i64,
    /// Normalized crawl root
    pub root: Url,
    pub max_pages: u32,
    pub delay: Duration,
    pub max_depth: Option<u32>,
    pub include_subdomains: bool,
    /// Queue the URLs from the site's sitemaps after the root
    pub use_sitemap: bool,
    /// Sitemap-index nesting followed while seeding
    pub sitemap_max_depth: u32,
    /// Product token used for robots.txt group matching
    pub agent: String,
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopEnd {
    /// Frontier exhausted or budget reached
    Finished,
    /// Cancellation observed; status already written
    Cancelled,
    /// The job left `running` behind our back (e.g. deleted)
    Abandoned,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    spec: JobSpec,
    storage: SharedStorage,
    client: Client,
    cancel: CancelFlag,
    registry: Arc<JobRegistry>,
    progress: JobProgress,
}

impl Coordinator {
    /// Creates a coordinator for a job that already exists in storage
    ///
    /// # Arguments
    ///
    /// * `spec` - What to crawl and how
    /// * `storage` - Shared storage handle
    /// * `client` - HTTP client carrying user agent and timeouts
    /// * `cancel` - Flag observed between pages
    /// * `registry` - The job removes itself from here when it ends
    pub fn new(
        spec: JobSpec,
        storage: SharedStorage,
        client: Client,
        cancel: CancelFlag,
        registry: Arc<JobRegistry>,
    ) -> Self {
        Self {
            spec,
            storage,
            client,
            cancel,
            registry,
            progress: JobProgress::default(),
        }
    }

    /// Spawns the job under a supervisor and returns the supervisor's handle
    pub fn spawn(self) -> JoinHandle<()> {
        let job_id = self.spec.job_id;
        let storage = Arc::clone(&self.storage);
        let registry = Arc::clone(&self.registry);
        spawn_supervised(job_id, storage, registry, self.run())
    }

    /// Runs the job to completion
    ///
    /// Never returns an error: every outcome is written to the job row and the
    /// job log, which is the only channel callers observe.
    pub async fn run(mut self) {
        let job_id = self.spec.job_id;

        if let Err(e) = self.run_inner().await {
            tracing::error!(job_id, error = %e, "Crawl job failed");
            self.fail(&e.to_string());
        }

        self.registry.remove(job_id);
    }

    async fn run_inner(&mut self) -> Result<(), CrawlLabError> {
        let job_id = self.spec.job_id;

        if self.cancel.is_cancelled() {
            self.mark_cancelled(JobStatus::Queued)?;
            return Ok(());
        }

        let started =
            with_storage(&self.storage, |s| s.update_job_status(job_id, JobStatus::Running, None))?;
        if !started {
            tracing::debug!(job_id, "Job no longer queued; not starting");
            return Ok(());
        }

        self.log(
            LogLevel::Info,
            &format!(
                "Crawl started: {} (max {} pages, {} ms delay)",
                self.spec.root,
                self.spec.max_pages,
                self.spec.delay.as_millis()
            ),
        )?;

        let robots = fetch_robots_txt(&self.client, &self.spec.root, &self.spec.agent).await;
        self.log_robots(&robots)?;

        let mut throttle = FetchThrottle::new(self.spec.delay, self.spec.max_pages)
            .with_crawl_delay(robots.crawl_delay());
        if throttle.effective_delay() > self.spec.delay {
            self.log(
                LogLevel::Info,
                &format!(
                    "Using robots.txt crawl-delay of {} ms",
                    throttle.effective_delay().as_millis()
                ),
            )?;
        }

        let scope = SiteScope::new(&self.spec.root, self.spec.include_subdomains);
        let mut frontier = Frontier::new(scope, self.spec.max_depth);
        frontier.enqueue(&self.spec.root, 0);

        if self.spec.use_sitemap {
            self.seed_from_sitemaps(&robots, &mut frontier, &mut throttle)
                .await?;
        }

        match self.crawl_loop(&robots, &mut frontier, &mut throttle).await? {
            LoopEnd::Finished => {
                // A cancel that raced the last page still wins over completion
                if self.cancel.is_cancelled() {
                    self.mark_cancelled(JobStatus::Running)?;
                    return Ok(());
                }

                let completed = with_storage(&self.storage, |s| {
                    s.update_job_status(job_id, JobStatus::Completed, None)
                })?;
                if completed {
                    self.log(
                        LogLevel::Info,
                        &format!(
                            "Crawl completed! {} pages crawled ({} failed, {} skipped)",
                            self.progress.pages_crawled,
                            self.progress.pages_failed,
                            self.progress.pages_skipped
                        ),
                    )?;
                }
            }
            LoopEnd::Cancelled => {}
            LoopEnd::Abandoned => {
                tracing::info!(job_id, "Job left running state externally; stopping");
            }
        }

        Ok(())
    }

    /// Drains the frontier until it is empty, the budget is spent, or the job stops
    async fn crawl_loop(
        &mut self,
        robots: &RobotsPolicy,
        frontier: &mut Frontier,
        throttle: &mut FetchThrottle,
    ) -> Result<LoopEnd, CrawlLabError> {
        let client = self.client.clone();
        let fetcher = PageFetcher::new(&client, robots);

        loop {
            if self.cancel.is_cancelled() {
                self.mark_cancelled(JobStatus::Running)?;
                return Ok(LoopEnd::Cancelled);
            }

            if throttle.is_exhausted() {
                self.log(
                    LogLevel::Info,
                    &format!("Page budget of {} reached", self.spec.max_pages),
                )?;
                return Ok(LoopEnd::Finished);
            }

            let Some(next) = frontier.dequeue() else {
                tracing::debug!(job_id = self.spec.job_id, "Frontier is empty");
                return Ok(LoopEnd::Finished);
            };
            frontier.mark_visited(&next.url);

            tracing::debug!(job_id = self.spec.job_id, url = %next.url, depth = next.depth, "Processing URL");

            let keep_going = match fetcher.fetch(&next.url, throttle).await {
                FetchOutcome::Skipped { reason } => {
                    self.progress.pages_skipped += 1;
                    self.log(LogLevel::Info, &reason)?;
                    true
                }
                FetchOutcome::Fetched(page) => self.handle_page(&next, page, frontier)?,
                FetchOutcome::Failed(error) => self.handle_failure(&next, error)?,
            };

            if !keep_going {
                return Ok(LoopEnd::Abandoned);
            }

            with_storage(&self.storage, |s| {
                s.update_job_progress(self.spec.job_id, self.progress)
            })?;
        }
    }

    /// Queues the in-scope URLs listed in the site's sitemaps behind the root
    ///
    /// Sitemap documents are paced by the job's throttle but do not use page
    /// budget; the queued URLs do when they are fetched.
    async fn seed_from_sitemaps(
        &mut self,
        robots: &RobotsPolicy,
        frontier: &mut Frontier,
        throttle: &mut FetchThrottle,
    ) -> Result<(), CrawlLabError> {
        let client = self.client.clone();
        let mut walker = SitemapWalker::new(
            PageFetcher::new(&client, robots),
            self.spec.max_pages as usize,
            self.spec.sitemap_max_depth,
        );

        let urls = walker.discover(&self.spec.root, robots, throttle).await;
        for note in walker.take_notes() {
            self.log(note.level, &note.message)?;
        }
        if urls.is_empty() {
            return Ok(());
        }

        // Depth 1: only the root itself is job-fatal when unreachable
        let queued = urls
            .iter()
            .filter(|url| frontier.enqueue(url, 1) == EnqueueOutcome::Queued)
            .count();
        self.log(
            LogLevel::Info,
            &format!("Queued {} of {} sitemap URLs", queued, urls.len()),
        )
    }

    /// Persists a fetched page and queues its internal links
    ///
    /// Returns `false` if the job is no longer accepting pages.
    fn handle_page(
        &mut self,
        queued: &QueuedUrl,
        page: PageResult,
        frontier: &mut Frontier,
    ) -> Result<bool, CrawlLabError> {
        if page.final_url != page.url {
            if queued.depth == 0 {
                self.adopt_root_redirect(&page.final_url, frontier)?;
            }
            frontier.mark_visited(&page.final_url);
        }

        let links: Vec<NewLink> = page
            .links
            .iter()
            .map(|link| NewLink {
                target_url: link.url.to_string(),
                anchor_text: link.anchor_text.clone(),
                is_internal: frontier.is_internal(&link.url),
            })
            .collect();

        let record = NewPage {
            url: queued.url.to_string(),
            final_url: Some(page.final_url.to_string()),
            status_code: page.status_code,
            title: page.title.clone(),
            meta_description: page.meta_description.clone(),
            h1: page.h1.clone(),
            content_type: page.content_type.clone(),
            word_count: page.word_count,
            content_length: page.content_length,
            load_time_ms: page.load_time_ms,
            depth: queued.depth,
            error_message: None,
            links,
            images: page
                .images
                .iter()
                .map(|image| NewImage {
                    image_url: image.url.clone(),
                    alt_text: image.alt.clone(),
                    byte_size: None,
                })
                .collect(),
        };

        let job_id = self.spec.job_id;
        if with_storage(&self.storage, |s| s.record_page(job_id, &record))?.is_none() {
            return self.still_running();
        }
        self.progress.pages_crawled += 1;

        let mut queued_links = 0;
        for link in &page.links {
            if frontier.enqueue(&link.url, queued.depth + 1) == EnqueueOutcome::Queued {
                queued_links += 1;
            }
        }

        self.log(
            LogLevel::Info,
            &format!(
                "Crawled {} ({}, {} links, {} new, {} ms)",
                queued.url,
                page.status_code,
                page.links.len(),
                queued_links,
                page.load_time_ms
            ),
        )?;

        Ok(true)
    }

    /// Records a failed fetch; the root failing at the network level is job-fatal
    fn handle_failure(
        &mut self,
        queued: &QueuedUrl,
        error: FetchError,
    ) -> Result<bool, CrawlLabError> {
        if queued.depth == 0 && error.is_network_level() {
            return Err(match error.kind {
                FetchErrorKind::Timeout => CrawlLabError::Timeout {
                    url: queued.url.to_string(),
                },
                _ => CrawlLabError::Unreachable(error.message),
            });
        }

        self.progress.pages_failed += 1;

        let record = NewPage {
            url: queued.url.to_string(),
            status_code: error.status_code.unwrap_or(0),
            load_time_ms: error.load_time_ms,
            depth: queued.depth,
            error_message: Some(error.message.clone()),
            ..NewPage::default()
        };

        let job_id = self.spec.job_id;
        if with_storage(&self.storage, |s| s.record_page(job_id, &record))?.is_none() {
            return self.still_running();
        }

        let level = match error.kind {
            FetchErrorKind::HttpStatus => LogLevel::Warn,
            _ => LogLevel::Error,
        };
        self.log(level, &format!("Failed to crawl {}: {}", queued.url, error))?;

        Ok(true)
    }

    /// Lets the rest of the site be reached when the root redirects to another host
    fn adopt_root_redirect(
        &mut self,
        final_url: &Url,
        frontier: &mut Frontier,
    ) -> Result<(), CrawlLabError> {
        let Some(host) = extract_domain(final_url) else {
            return Ok(());
        };
        if frontier.is_internal(final_url) {
            return Ok(());
        }

        frontier.add_scope_alias(&host);
        self.log(
            LogLevel::Info,
            &format!("Root redirected to {}; treating {} as internal", final_url, host),
        )
    }

    fn still_running(&self) -> Result<bool, CrawlLabError> {
        let job = with_storage(&self.storage, |s| s.get_job(self.spec.job_id))?;
        Ok(matches!(job, Some(job) if job.status == JobStatus::Running))
    }

    fn log_robots(&self, robots: &RobotsPolicy) -> Result<(), CrawlLabError> {
        match robots.fallback_reason() {
            Some(reason) => self.log(
                LogLevel::Info,
                &format!("robots.txt unavailable ({}); using allow-all policy", reason),
            ),
            None => self.log(
                LogLevel::Info,
                &format!(
                    "Loaded robots.txt: {} groups, {} sitemaps",
                    robots.groups().len(),
                    robots.sitemaps().len()
                ),
            ),
        }
    }

    fn mark_cancelled(&self, from: JobStatus) -> Result<(), CrawlLabError> {
        let job_id = self.spec.job_id;
        if !from.can_transition_to(JobStatus::Cancelled) {
            return Err(CrawlLabError::InvalidTransition {
                from,
                to: JobStatus::Cancelled,
            });
        }

        if with_storage(&self.storage, |s| {
            s.update_job_status(job_id, JobStatus::Cancelled, None)
        })? {
            self.log(LogLevel::Warn, "Crawl cancelled by user")?;
        }
        Ok(())
    }

    /// Marks the job failed and writes a single error entry
    fn fail(&self, message: &str) {
        record_failure(&self.storage, self.spec.job_id, message);
    }

    /// Appends to the job log and mirrors the entry to tracing
    fn log(&self, level: LogLevel, message: &str) -> Result<(), CrawlLabError> {
        let job_id = self.spec.job_id;
        match level {
            LogLevel::Info => tracing::info!(job_id, "{}", message),
            LogLevel::Warn => tracing::warn!(job_id, "{}", message),
            LogLevel::Error => tracing::error!(job_id, "{}", message),
        }

        with_storage(&self.storage, |s| s.append_log(job_id, level, message))?;
        Ok(())
    }
}

/// Runs `job` on its own task and turns a panic into a failed job
///
/// The returned handle resolves once the job task has ended either way. On a
/// panic the job is marked `failed` with one error log entry and removed from
/// the registry.
pub fn spawn_supervised<F>(
    job_id: i64,
    storage: SharedStorage,
    registry: Arc<JobRegistry>,
    job: F,
) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = tokio::spawn(job).await {
            tracing::error!(job_id, error = %e, "Crawl task aborted");
            record_failure(&storage, job_id, &format!("Crawl task aborted: {}", e));
            registry.remove(job_id);
        }
    })
}

/// Best effort: marks the job failed and appends one error entry
fn record_failure(storage: &SharedStorage, job_id: i64, message: &str) {
    let result = with_storage(storage, |s| {
        if s.update_job_status(job_id, JobStatus::Failed, Some(message))? {
            s.append_log(job_id, LogLevel::Error, &format!("Crawl failed: {}", message))?;
        }
        Ok(())
    });

    if let Err(e) = result {
        tracing::error!(job_id, error = %e, "Could not record job failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{shared, NewJob, SqliteStorage};

    fn running_job(storage: &SharedStorage) -> i64 {
        with_storage(storage, |s| {
            let id = s.create_job(&NewJob {
                url: "https://example.com/".to_string(),
                max_pages: 10,
                delay_ms: 0,
                timeout_ms: 1000,
            })?;
            s.update_job_status(id, JobStatus::Running, None)?;
            Ok(id)
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_panicking_job_is_marked_failed() {
        let storage = shared(SqliteStorage::open_in_memory().unwrap());
        let registry = Arc::new(JobRegistry::new());
        let job_id = running_job(&storage);

        registry.start(job_id, |_cancel| tokio::spawn(async {}));
        assert!(registry.is_live(job_id));

        spawn_supervised(job_id, Arc::clone(&storage), Arc::clone(&registry), async {
            panic!("crawl loop blew up");
        })
        .await
        .unwrap();

        let job = with_storage(&storage, |s| s.get_job(job_id)).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("Crawl task aborted"));

        let errors = with_storage(&storage, |s| s.list_logs(job_id, Some(LogLevel::Error), 10))
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert!(!registry.is_live(job_id));
    }

    #[tokio::test]
    async fn test_finished_job_is_left_alone() {
        let storage = shared(SqliteStorage::open_in_memory().unwrap());
        let registry = Arc::new(JobRegistry::new());
        let job_id = running_job(&storage);

        spawn_supervised(job_id, Arc::clone(&storage), Arc::clone(&registry), async {})
            .await
            .unwrap();

        let job = with_storage(&storage, |s| s.get_job(job_id)).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
    }
}
