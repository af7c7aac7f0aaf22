//! Robots.txt policy implementation
//!
//! Allow/deny decisions are delegated to the robotstxt crate (longest match
//! wins, `Allow` wins ties, the agent's own group before `*`). A small line
//! parser on top exposes the rule groups, `Crawl-delay` and `Sitemap:` lines.

use chrono::{DateTime, Utc};
use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Longest crawl delay honored; larger `Crawl-delay` values are clamped to it
pub const MAX_CRAWL_DELAY: Duration = Duration::from_secs(60);

/// Whether a robots.txt rule allows or disallows its path prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Allow,
    Disallow,
}

/// A single `Allow:`/`Disallow:` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobotsRule {
    pub kind: RuleKind,
    pub path: String,
}

/// A `User-agent` group and the rules that follow it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotsGroup {
    /// Lowercased agent names, `*` for the wildcard group
    pub agents: Vec<String>,
    pub rules: Vec<RobotsRule>,
    /// Crawl delay in seconds
    pub crawl_delay: Option<f64>,
}

/// Parsed robots.txt policy for one crawl target
///
/// Job-scoped: built once per crawl and never shared across jobs.
#[derive(Debug, Clone)]
pub struct RobotsPolicy {
    /// Raw robots.txt content (empty for the permissive fallback)
    content: String,
    /// Product token matched against `User-agent` lines
    agent: String,
    groups: Vec<RobotsGroup>,
    sitemaps: Vec<String>,
    /// Why the permissive default was used, if it was
    fallback_reason: Option<String>,
    fetched_at: DateTime<Utc>,
}

impl RobotsPolicy {
    /// Creates a policy from raw robots.txt content
    ///
    /// # Arguments
    ///
    /// * `content` - The raw robots.txt file content
    /// * `agent` - The crawler's product token (e.g. "CrawlLab")
    pub fn from_content(content: &str, agent: &str) -> Self {
        let (groups, sitemaps) = parse_lines(content);
        Self {
            content: content.to_string(),
            agent: agent.to_string(),
            groups,
            sitemaps,
            fallback_reason: None,
            fetched_at: Utc::now(),
        }
    }

    /// Creates a permissive policy that allows everything
    ///
    /// This is used when robots.txt is absent or cannot be fetched.
    pub fn permissive(agent: &str, reason: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            agent: agent.to_string(),
            groups: Vec::new(),
            sitemaps: Vec::new(),
            fallback_reason: Some(reason.into()),
            fetched_at: Utc::now(),
        }
    }

    /// Checks if a URL (or absolute path) may be fetched by this crawler
    pub fn is_allowed(&self, url: &str) -> bool {
        if self.content.trim().is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, &self.agent, url)
    }

    /// Crawl delay that applies to this crawler
    ///
    /// The crawler's own group wins over the `*` group. Values above
    /// [`MAX_CRAWL_DELAY`] are clamped to it.
    pub fn crawl_delay(&self) -> Option<Duration> {
        let agent = self.agent.to_lowercase();

        let specific = self
            .groups
            .iter()
            .filter(|g| g.agents.iter().any(|a| *a == agent))
            .find_map(|g| g.crawl_delay);

        let wildcard = || {
            self.groups
                .iter()
                .filter(|g| g.agents.iter().any(|a| a == "*"))
                .find_map(|g| g.crawl_delay)
        };

        specific
            .or_else(wildcard)
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .map_or(MAX_CRAWL_DELAY, |delay| delay.min(MAX_CRAWL_DELAY))
            })
    }

    /// Sitemap URLs in the order they appear, regardless of grouping
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    pub fn groups(&self) -> &[RobotsGroup] {
        &self.groups
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        self.fallback_reason.as_deref()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

/// Splits robots.txt content into agent groups and the global sitemap list
fn parse_lines(content: &str) -> (Vec<RobotsGroup>, Vec<String>) {
    let mut groups: Vec<RobotsGroup> = Vec::new();
    let mut sitemaps = Vec::new();
    let mut current: Option<RobotsGroup> = None;
    // A User-agent line following rules starts a new group
    let mut in_agent_run = false;

    for line in content.lines() {
        let line = match line.split_once('#') {
            Some((before, _)) => before,
            None => line,
        }
        .trim();

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                if !in_agent_run {
                    if let Some(group) = current.take() {
                        groups.push(group);
                    }
                    current = Some(RobotsGroup::default());
                }
                if let Some(group) = current.as_mut() {
                    group.agents.push(value.to_lowercase());
                }
                in_agent_run = true;
            }
            "allow" | "disallow" => {
                in_agent_run = false;
                // Empty Disallow means "allow everything" and adds no rule
                if let (Some(group), false) = (current.as_mut(), value.is_empty()) {
                    let kind = if key == "allow" {
                        RuleKind::Allow
                    } else {
                        RuleKind::Disallow
                    };
                    group.rules.push(RobotsRule {
                        kind,
                        path: value.to_string(),
                    });
                }
            }
            "crawl-delay" => {
                in_agent_run = false;
                if let (Some(group), Ok(delay)) = (current.as_mut(), value.parse::<f64>()) {
                    group.crawl_delay = Some(delay);
                }
            }
            "sitemap" => {
                if !value.is_empty() {
                    sitemaps.push(value.to_string());
                }
            }
            _ => {}
        }
    }

    if let Some(group) = current {
        groups.push(group);
    }

    (groups, sitemaps)
}
