//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching gated by robots.txt
//! - HTML parsing and link, image and metadata extraction
//! - Request pacing and the per-job page budget
//! - The breadth-first frontier
//! - Job coordination, cancellation and the service boundary

mod coordinator;
mod fetcher;
mod frontier;
mod parser;
mod registry;
mod service;
mod throttle;

pub use coordinator::{spawn_supervised, Coordinator, JobSpec};
pub use fetcher::{
    build_http_client, redirect_target, user_agent_string, FetchError, FetchErrorKind,
    FetchOutcome, PageFetcher, PageResult, RawResponse, MAX_BODY_BYTES, MAX_REDIRECTS,
};
pub use frontier::{EnqueueOutcome, Frontier, QueuedUrl};
pub use parser::{parse_html, resolve_link, ExtractedImage, ExtractedLink, ParsedPage};
pub use registry::{CancelFlag, JobRegistry};
pub use service::{
    CancelOutcome, CrawlOptions, CrawlService, JobSnapshot, LogQuery, DEFAULT_LOG_LIMIT,
    MAX_LOG_LIMIT,
};
pub use throttle::FetchThrottle;
