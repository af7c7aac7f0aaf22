//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawl engine, including:
//! - SQLite database initialization and schema management
//! - Job rows and their status transitions
//! - Page, link and image rows scoped to a job
//! - The append-only per-job log
//! - Cascading teardown of a job

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::{JobStatus, LogLevel};
use crate::CrawlLabError;

use std::path::Path;
use std::sync::{Arc, Mutex};

/// Storage handle shared between the service and its running jobs
///
/// One connection, writes serialized by the mutex. Never hold the guard
/// across an `.await`; use [`with_storage`].
pub type SharedStorage = Arc<Mutex<dyn Storage>>;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(CrawlLabError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, CrawlLabError> {
    SqliteStorage::new(path)
}

/// Wraps a storage backend for sharing across tasks
pub fn shared<S: Storage + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Runs `f` with the storage lock held
///
/// The guard is released before this returns, so callers can freely await
/// afterwards without making their future `!Send`.
pub fn with_storage<T>(
    storage: &SharedStorage,
    f: impl FnOnce(&mut dyn Storage) -> StorageResult<T>,
) -> StorageResult<T> {
    let mut guard = storage.lock().map_err(|_| StorageError::LockPoisoned)?;
    f(&mut *guard)
}

/// Parameters for a new crawl job row
#[derive(Debug, Clone)]
pub struct NewJob {
    pub url: String,
    pub max_pages: u32,
    pub delay_ms: u64,
    pub timeout_ms: u64,
}

/// Represents a crawl job in the database
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: i64,
    pub url: String,
    pub status: JobStatus,
    pub max_pages: u32,
    pub delay_ms: u64,
    pub timeout_ms: u64,
    pub pages_crawled: u32,
    pub pages_failed: u32,
    pub pages_skipped: u32,
    /// Message of the job-fatal condition, if the job failed
    pub error: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

/// Counters the orchestrator writes after every page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobProgress {
    pub pages_crawled: u32,
    pub pages_failed: u32,
    pub pages_skipped: u32,
}

/// Row counts of everything owned by a job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub pages: u64,
    pub links: u64,
    pub images: u64,
    pub logs: u64,
}

/// A job with its row counts, as listed by `list_jobs`
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub job: JobRecord,
    pub counts: JobCounts,
}

/// A page to persist, together with its child rows
#[derive(Debug, Clone, Default)]
pub struct NewPage {
    pub url: String,
    pub final_url: Option<String>,
    /// HTTP status, 0 when no response was received
    pub status_code: u16,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub h1: Option<String>,
    pub content_type: Option<String>,
    pub word_count: u32,
    pub content_length: u64,
    pub load_time_ms: u64,
    pub depth: u32,
    pub error_message: Option<String>,
    pub links: Vec<NewLink>,
    pub images: Vec<NewImage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub target_url: String,
    pub anchor_text: Option<String>,
    pub is_internal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImage {
    pub image_url: String,
    pub alt_text: Option<String>,
    pub byte_size: Option<u64>,
}

/// Represents a crawled page in the database
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub id: i64,
    pub job_id: i64,
    pub url: String,
    pub final_url: Option<String>,
    pub status_code: u16,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub h1: Option<String>,
    pub content_type: Option<String>,
    pub word_count: u32,
    pub content_length: u64,
    pub load_time_ms: u64,
    pub depth: u32,
    pub error_message: Option<String>,
    pub crawled_at: String,
}

impl PageRecord {
    /// Returns true if the page was fetched with a 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// A page with the number of links and images recorded for it
#[derive(Debug, Clone)]
pub struct PageSummary {
    pub page: PageRecord,
    pub link_count: u64,
    pub image_count: u64,
}

/// Represents a link relationship recorded on a page
#[derive(Debug, Clone)]
pub struct LinkRecord {
    pub id: i64,
    pub page_id: i64,
    /// URL of the page the link was found on
    pub page_url: String,
    pub target_url: String,
    pub anchor_text: Option<String>,
    pub is_internal: bool,
}

/// Represents an image recorded on a page
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub id: i64,
    pub page_id: i64,
    /// URL of the page the image was found on
    pub page_url: String,
    pub image_url: String,
    pub alt_text: Option<String>,
    pub byte_size: Option<u64>,
}

impl ImageRecord {
    /// Returns true if the image has no usable alt text
    pub fn is_missing_alt(&self) -> bool {
        self.alt_text.as_deref().map_or(true, |alt| alt.trim().is_empty())
    }
}

/// Image totals for a job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageStats {
    pub total: u64,
    pub missing_alt: u64,
}

/// Represents one crawl log entry
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub id: i64,
    pub job_id: i64,
    pub level: LogLevel,
    pub message: String,
    pub created_at: String,
}

/// 1-based page window for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 50 }
    }
}
