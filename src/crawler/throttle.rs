//! Per-job fetch pacing and page budget
//!
//! One `FetchThrottle` belongs to one running job (or one sitemap walk). It is
//! never shared: a slow site must not pace an unrelated crawl.

use std::time::Duration;
use tokio::time::Instant;

/// Enforces a minimum delay between fetches and a maximum number of fetches
#[derive(Debug)]
pub struct FetchThrottle {
    /// Minimum spacing between two consecutive fetches
    min_delay: Duration,
    /// When the previous fetch was released
    last_fetch: Option<Instant>,
    /// Page budget for this job
    max_pages: u32,
    /// Fetches charged against the budget so far
    charged: u32,
}

impl FetchThrottle {
    /// Creates a throttle with the configured delay and page budget
    pub fn new(delay: Duration, max_pages: u32) -> Self {
        Self {
            min_delay: delay,
            last_fetch: None,
            max_pages,
            charged: 0,
        }
    }

    /// Raises the delay to the robots.txt crawl-delay if that is longer
    ///
    /// The effective delay is `max(configured delay, crawl-delay)`.
    pub fn with_crawl_delay(mut self, crawl_delay: Option<Duration>) -> Self {
        if let Some(crawl_delay) = crawl_delay {
            self.min_delay = self.min_delay.max(crawl_delay);
        }
        self
    }

    /// Waits until at least the effective delay has elapsed since the previous fetch
    ///
    /// The first call returns immediately.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last_fetch {
            match last.checked_add(self.min_delay) {
                Some(ready_at) if Instant::now() < ready_at => {
                    tokio::time::sleep_until(ready_at).await;
                }
                Some(_) => {}
                None => tokio::time::sleep(self.min_delay).await,
            }
        }
        self.last_fetch = Some(Instant::now());
    }

    /// Counts one page (success or failure) against the page budget
    ///
    /// Redirect hops are paced by [`FetchThrottle::wait`] but charged once.
    pub fn charge(&mut self) {
        self.charged = self.charged.saturating_add(1);
    }

    /// Returns true once the page budget is used up
    pub fn is_exhausted(&self) -> bool {
        self.charged >= self.max_pages
    }

    /// Fetches left before the budget is exhausted
    pub fn remaining(&self) -> u32 {
        self.max_pages.saturating_sub(self.charged)
    }

    pub fn effective_delay(&self) -> Duration {
        self.min_delay
    }
}
