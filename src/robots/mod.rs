//! Robots.txt handling module
//!
//! This module fetches and parses a site's robots.txt into a [`RobotsPolicy`].
//! A missing or unreachable robots.txt never stops a crawl: the fetch falls
//! back to a permissive policy that records why.

mod parser;

pub use parser::{RobotsGroup, RobotsPolicy, RobotsRule, RuleKind, MAX_CRAWL_DELAY};

use crate::crawler::{redirect_target, MAX_REDIRECTS};
use crate::url::origin_root;
use reqwest::Client;
use url::Url;

/// Fetches and parses robots.txt for the origin of `site`
///
/// Redirects are followed up to [`MAX_REDIRECTS`] hops.
///
/// # Arguments
///
/// * `client` - The shared HTTP client (carries user agent and timeouts)
/// * `site` - Any URL on the target site
/// * `agent` - The crawler's product token used for group matching
///
/// # Returns
///
/// The parsed policy, or a permissive policy whose `fallback_reason` explains
/// why robots.txt could not be used (`No robots.txt found`, `HTTP <code>`, or
/// the network error).
pub async fn fetch_robots_txt(client: &Client, site: &Url, agent: &str) -> RobotsPolicy {
    let robots_url = match origin_root(site).join("/robots.txt") {
        Ok(url) => url,
        Err(e) => return RobotsPolicy::permissive(agent, format!("Invalid robots.txt URL: {}", e)),
    };

    tracing::debug!(url = %robots_url, "Fetching robots.txt");

    let mut target = robots_url.clone();
    let mut redirects = 0;
    let response = loop {
        let response = match client.get(target.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                let reason = if e.is_timeout() {
                    format!("Timed out fetching {}", robots_url)
                } else {
                    format!("Failed to fetch {}: {}", robots_url, e)
                };
                tracing::debug!(url = %robots_url, "{}", reason);
                return RobotsPolicy::permissive(agent, reason);
            }
        };

        match redirect_target(&response, &target) {
            Some(next) if redirects < MAX_REDIRECTS => {
                redirects += 1;
                target = next;
            }
            Some(_) => {
                return RobotsPolicy::permissive(
                    agent,
                    format!("Too many redirects fetching {}", robots_url),
                )
            }
            None => break response,
        }
    };

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
        return RobotsPolicy::permissive(agent, "No robots.txt found");
    }
    if !status.is_success() {
        return RobotsPolicy::permissive(agent, format!("HTTP {}", status.as_u16()));
    }

    match response.text().await {
        Ok(body) => RobotsPolicy::from_content(&body, agent),
        Err(e) => RobotsPolicy::permissive(agent, format!("Failed to read robots.txt: {}", e)),
    }
}
