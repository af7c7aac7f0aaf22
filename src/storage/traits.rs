//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::{JobStatus, LogLevel};
use crate::storage::{
    ImageRecord, ImageStats, JobCounts, JobProgress, JobRecord, JobSummary, LinkRecord, LogRecord,
    NewJob, NewPage, PageRecord, PageSummary, Pagination,
};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Job not found: {0}")]
    JobNotFound(i64),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines every database operation the crawl engine needs. The
/// orchestrator of a job is the only writer of that job's page and log rows;
/// everything else is a read, a status transition, or teardown.
pub trait Storage: Send {
    // ===== Job Management =====

    /// Creates a new job in the `queued` state
    ///
    /// # Returns
    ///
    /// The ID of the newly created job
    fn create_job(&mut self, job: &NewJob) -> StorageResult<i64>;

    /// Gets a job by ID, `None` if it does not exist
    fn get_job(&self, job_id: i64) -> StorageResult<Option<JobRecord>>;

    /// Lists the most recent jobs with their row counts
    fn list_jobs(&self, limit: u32) -> StorageResult<Vec<JobSummary>>;

    /// Moves an active job to `status`
    ///
    /// Only applies while the job is `queued` or `running`, so a terminal job
    /// is never resurrected. Sets `started_at` on the first move to `running`
    /// and `completed_at` on any terminal status.
    ///
    /// # Returns
    ///
    /// `true` if the row changed
    fn update_job_status(
        &mut self,
        job_id: i64,
        status: JobStatus,
        error: Option<&str>,
    ) -> StorageResult<bool>;

    /// Writes the job's page counters; ignored unless the job is `running`
    fn update_job_progress(&mut self, job_id: i64, progress: JobProgress) -> StorageResult<()>;

    // ===== Page Management =====

    /// Persists a page with its links and images in one transaction
    ///
    /// The insert only happens while the job is `running` and the URL has not
    /// been recorded for this job yet.
    ///
    /// # Returns
    ///
    /// * `Some(page_id)` - The page and its child rows were written
    /// * `None` - Nothing was written (job no longer running, or duplicate URL)
    fn record_page(&mut self, job_id: i64, page: &NewPage) -> StorageResult<Option<i64>>;

    /// Gets all pages of a job in crawl order
    fn get_pages(&self, job_id: i64) -> StorageResult<Vec<PageRecord>>;

    /// Gets one window of pages with per-page link and image counts
    fn list_pages(&self, job_id: i64, window: Pagination) -> StorageResult<Vec<PageSummary>>;

    fn count_pages(&self, job_id: i64) -> StorageResult<u64>;

    /// Gets all links recorded for a job
    fn get_links(&self, job_id: i64) -> StorageResult<Vec<LinkRecord>>;

    /// Gets images recorded for a job, optionally only those missing alt text
    ///
    /// `window` of `None` returns every matching image.
    fn get_images(
        &self,
        job_id: i64,
        missing_alt_only: bool,
        window: Option<Pagination>,
    ) -> StorageResult<Vec<ImageRecord>>;

    fn image_stats(&self, job_id: i64) -> StorageResult<ImageStats>;

    /// Counts pages, links, images and logs owned by a job
    fn job_counts(&self, job_id: i64) -> StorageResult<JobCounts>;

    // ===== Logs =====

    /// Appends one log entry; log rows are never updated
    fn append_log(&mut self, job_id: i64, level: LogLevel, message: &str) -> StorageResult<i64>;

    /// Lists log entries most recent first
    fn list_logs(
        &self,
        job_id: i64,
        level: Option<LogLevel>,
        limit: u32,
    ) -> StorageResult<Vec<LogRecord>>;

    // ===== Teardown =====

    /// Deletes a job and everything it owns
    ///
    /// Rows go child-to-parent: images, links, pages, logs, then the job.
    ///
    /// # Returns
    ///
    /// `false` if the job did not exist
    fn delete_job(&mut self, job_id: i64) -> StorageResult<bool>;
}
