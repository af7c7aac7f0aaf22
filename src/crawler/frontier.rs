//! Breadth-first crawl frontier
//!
//! The frontier owns the pending FIFO queue and the visited set for one job.
//! Every URL is normalized before it is compared, so `/blog/`, `/blog#top`
//! and `//blog` are the same entry.

use crate::url::{normalize_parsed, SiteScope};
use std::collections::{HashSet, VecDeque};
use url::Url;

/// A URL waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedUrl {
    /// Normalized URL
    pub url: Url,

    /// Link depth from the crawl root (root is 0)
    pub depth: u32,
}

/// What happened to a URL offered to [`Frontier::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Already pending or visited
    AlreadySeen,
    /// Host is outside the site scope
    External,
    /// Deeper than the configured depth limit
    TooDeep,
    /// Not an HTTP(S) URL with a host
    Invalid,
}

/// Deduplicated FIFO queue of URLs for one crawl job
#[derive(Debug)]
pub struct Frontier {
    scope: SiteScope,
    max_depth: Option<u32>,
    pending: VecDeque<QueuedUrl>,
    pending_set: HashSet<String>,
    visited: HashSet<String>,
}

impl Frontier {
    /// Creates an empty frontier bounded to `scope`
    ///
    /// # Arguments
    ///
    /// * `scope` - Hosts eligible for traversal
    /// * `max_depth` - Optional link-depth limit (`None` disables it)
    pub fn new(scope: SiteScope, max_depth: Option<u32>) -> Self {
        Self {
            scope,
            max_depth,
            pending: VecDeque::new(),
            pending_set: HashSet::new(),
            visited: HashSet::new(),
        }
    }

    /// Normalizes `url` and appends it to the queue if it is new and in scope
    pub fn enqueue(&mut self, url: &Url, depth: u32) -> EnqueueOutcome {
        let Ok(url) = normalize_parsed(url.clone()) else {
            return EnqueueOutcome::Invalid;
        };

        if !self.scope.contains(&url) {
            return EnqueueOutcome::External;
        }

        if self.max_depth.is_some_and(|max| depth > max) {
            return EnqueueOutcome::TooDeep;
        }

        let key = url.as_str().to_string();
        if self.visited.contains(&key) || self.pending_set.contains(&key) {
            return EnqueueOutcome::AlreadySeen;
        }

        self.pending_set.insert(key);
        self.pending.push_back(QueuedUrl { url, depth });
        EnqueueOutcome::Queued
    }

    /// Pops the oldest pending URL, skipping any that were visited meanwhile
    pub fn dequeue(&mut self) -> Option<QueuedUrl> {
        while let Some(next) = self.pending.pop_front() {
            self.pending_set.remove(next.url.as_str());
            if !self.visited.contains(next.url.as_str()) {
                return Some(next);
            }
        }
        None
    }

    /// Records a URL as visited; calling it twice is harmless
    pub fn mark_visited(&mut self, url: &Url) {
        let key = normalize_parsed(url.clone())
            .map(|u| u.as_str().to_string())
            .unwrap_or_else(|_| url.as_str().to_string());
        self.visited.insert(key);
    }

    /// Returns true if the URL's host belongs to the crawl target
    pub fn is_internal(&self, url: &Url) -> bool {
        self.scope.contains(url)
    }

    /// Treats `host` as part of the site (used after a root redirect)
    pub fn add_scope_alias(&mut self, host: &str) {
        self.scope.add_alias(host);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn visited_len(&self) -> usize {
        self.visited.len()
    }
}
