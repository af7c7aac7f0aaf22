//! Configuration module for Crawl Lab
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use crawl_lab::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawl-lab.toml")).unwrap();
//! println!("Default page budget: {}", config.crawler.max_pages);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, OutputConfig, SitemapConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

pub use validation::{
    validate, validate_crawl_limits, MAX_DELAY_MS, MAX_PAGES_LIMIT, MIN_TIMEOUT_MS,
};
