//! URL handling module for Crawl Lab
//!
//! This module provides URL normalization, host extraction and the site scope
//! that decides which discovered links belong to the crawl target.

mod domain;
mod matcher;
mod normalize;

use ::url::Url;

// Re-export main functions
pub use domain::{extract_domain, origin_root};
pub use matcher::is_same_or_subdomain;
pub use normalize::{normalize_parsed, normalize_url};

/// The set of hosts a crawl job is allowed to traverse
///
/// A job starts with the target's host. If the root page redirects to another
/// host (e.g. `example.com` -> `www.example.com`) the coordinator registers it
/// as an alias so the rest of the site is still reachable.
#[derive(Debug, Clone)]
pub struct SiteScope {
    hosts: Vec<String>,
    include_subdomains: bool,
}

impl SiteScope {
    /// Creates a scope rooted at the host of `root`
    ///
    /// # Arguments
    ///
    /// * `root` - The crawl target
    /// * `include_subdomains` - Whether `*.host` also counts as internal
    pub fn new(root: &Url, include_subdomains: bool) -> Self {
        Self {
            hosts: extract_domain(root).into_iter().collect(),
            include_subdomains,
        }
    }

    /// Adds another host that should be treated as internal
    pub fn add_alias(&mut self, host: &str) {
        let host = host.to_lowercase();
        if !self.hosts.contains(&host) {
            self.hosts.push(host);
        }
    }

    /// Returns true if the URL's host belongs to the site
    pub fn contains(&self, url: &Url) -> bool {
        let Some(candidate) = extract_domain(url) else {
            return false;
        };

        self.hosts.iter().any(|site| {
            if self.include_subdomains {
                is_same_or_subdomain(site, &candidate)
            } else {
                *site == candidate
            }
        })
    }

    /// Hosts currently in scope, primary host first
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }
}
