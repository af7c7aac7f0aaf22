//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::{JobStatus, LogLevel};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageResult};
use crate::storage::{
    ImageRecord, ImageStats, JobCounts, JobProgress, JobRecord, JobSummary, LinkRecord, LogRecord,
    NewJob, NewPage, PageRecord, PageSummary, Pagination,
};
use crate::CrawlLabError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const JOB_COLUMNS: &str = "j.id, j.url, j.status, j.max_pages, j.delay_ms, j.timeout_ms,
     j.pages_crawled, j.pages_failed, j.pages_skipped, j.error, j.created_at,
     j.started_at, j.completed_at";

const PAGE_COLUMNS: &str = "p.id, p.job_id, p.url, p.final_url, p.status_code, p.title,
     p.meta_description, p.h1, p.content_type, p.word_count, p.content_length,
     p.load_time_ms, p.depth, p.error_message, p.crawled_at";

/// Number of columns in `JOB_COLUMNS`
const JOB_COLUMN_COUNT: usize = 13;

/// Number of columns in `PAGE_COLUMNS`
const PAGE_COLUMN_COUNT: usize = 15;

const MISSING_ALT: &str = "(i.alt_text IS NULL OR TRIM(i.alt_text) = '')";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(CrawlLabError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, CrawlLabError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (tests and throwaway runs)
    pub fn open_in_memory() -> Result<Self, CrawlLabError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn to_u32(value: i64) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    Ok(JobRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        status: JobStatus::from_db_string(&row.get::<_, String>(2)?)
            .unwrap_or(JobStatus::Failed),
        max_pages: to_u32(row.get(3)?),
        delay_ms: to_u64(row.get(4)?),
        timeout_ms: to_u64(row.get(5)?),
        pages_crawled: to_u32(row.get(6)?),
        pages_failed: to_u32(row.get(7)?),
        pages_skipped: to_u32(row.get(8)?),
        error: row.get(9)?,
        created_at: row.get(10)?,
        started_at: row.get(11)?,
        completed_at: row.get(12)?,
    })
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<PageRecord> {
    Ok(PageRecord {
        id: row.get(0)?,
        job_id: row.get(1)?,
        url: row.get(2)?,
        final_url: row.get(3)?,
        status_code: u16::try_from(row.get::<_, i64>(4)?).unwrap_or(0),
        title: row.get(5)?,
        meta_description: row.get(6)?,
        h1: row.get(7)?,
        content_type: row.get(8)?,
        word_count: to_u32(row.get(9)?),
        content_length: to_u64(row.get(10)?),
        load_time_ms: to_u64(row.get(11)?),
        depth: to_u32(row.get(12)?),
        error_message: row.get(13)?,
        crawled_at: row.get(14)?,
    })
}

fn image_from_row(row: &Row<'_>) -> rusqlite::Result<ImageRecord> {
    Ok(ImageRecord {
        id: row.get(0)?,
        page_id: row.get(1)?,
        page_url: row.get(2)?,
        image_url: row.get(3)?,
        alt_text: row.get(4)?,
        byte_size: row.get::<_, Option<i64>>(5)?.map(to_u64),
    })
}

impl Storage for SqliteStorage {
    // ===== Job Management =====

    fn create_job(&mut self, job: &NewJob) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO crawl_jobs (url, status, max_pages, delay_ms, timeout_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                job.url,
                JobStatus::Queued.to_db_string(),
                job.max_pages,
                to_i64(job.delay_ms),
                to_i64(job.timeout_ms),
                now
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_job(&self, job_id: i64) -> StorageResult<Option<JobRecord>> {
        let sql = format!("SELECT {} FROM crawl_jobs j WHERE j.id = ?1", JOB_COLUMNS);
        let job = self
            .conn
            .query_row(&sql, params![job_id], job_from_row)
            .optional()?;
        Ok(job)
    }

    fn list_jobs(&self, limit: u32) -> StorageResult<Vec<JobSummary>> {
        let sql = format!(
            "SELECT {},
                (SELECT COUNT(*) FROM crawled_pages p WHERE p.job_id = j.id),
                (SELECT COUNT(*) FROM crawled_links l
                    JOIN crawled_pages p ON l.page_id = p.id WHERE p.job_id = j.id),
                (SELECT COUNT(*) FROM crawled_images i
                    JOIN crawled_pages p ON i.page_id = p.id WHERE p.job_id = j.id),
                (SELECT COUNT(*) FROM crawl_logs g WHERE g.job_id = j.id)
             FROM crawl_jobs j ORDER BY j.id DESC LIMIT ?1",
            JOB_COLUMNS
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(params![limit], |row| {
                Ok(JobSummary {
                    job: job_from_row(row)?,
                    counts: JobCounts {
                        pages: to_u64(row.get(JOB_COLUMN_COUNT)?),
                        links: to_u64(row.get(JOB_COLUMN_COUNT + 1)?),
                        images: to_u64(row.get(JOB_COLUMN_COUNT + 2)?),
                        logs: to_u64(row.get(JOB_COLUMN_COUNT + 3)?),
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(jobs)
    }

    fn update_job_status(
        &mut self,
        job_id: i64,
        status: JobStatus,
        error: Option<&str>,
    ) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE crawl_jobs SET
                status = ?1,
                started_at = CASE WHEN ?1 = 'running' THEN COALESCE(started_at, ?2) ELSE started_at END,
                completed_at = CASE WHEN ?3 THEN ?2 ELSE completed_at END,
                error = COALESCE(?4, error)
             WHERE id = ?5
               AND status IN ('queued', 'running')
               AND (?1 != 'running' OR status = 'queued')",
            params![
                status.to_db_string(),
                now,
                status.is_terminal(),
                error,
                job_id
            ],
        )?;
        Ok(changed > 0)
    }

    fn update_job_progress(&mut self, job_id: i64, progress: JobProgress) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE crawl_jobs SET pages_crawled = ?1, pages_failed = ?2, pages_skipped = ?3
             WHERE id = ?4 AND status = 'running'",
            params![
                progress.pages_crawled,
                progress.pages_failed,
                progress.pages_skipped,
                job_id
            ],
        )?;
        Ok(())
    }

    // ===== Page Management =====

    fn record_page(&mut self, job_id: i64, page: &NewPage) -> StorageResult<Option<i64>> {
        let tx = self.conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        // Guarded insert: nothing lands once the job has left `running`
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO crawled_pages
                (job_id, url, final_url, status_code, title, meta_description, h1,
                 content_type, word_count, content_length, load_time_ms, depth,
                 error_message, crawled_at)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14
             FROM crawl_jobs WHERE id = ?1 AND status = 'running'",
            params![
                job_id,
                page.url,
                page.final_url,
                page.status_code,
                page.title,
                page.meta_description,
                page.h1,
                page.content_type,
                page.word_count,
                to_i64(page.content_length),
                to_i64(page.load_time_ms),
                page.depth,
                page.error_message,
                now
            ],
        )?;

        if inserted == 0 {
            return Ok(None);
        }

        let page_id = tx.last_insert_rowid();

        {
            let mut link_stmt = tx.prepare(
                "INSERT INTO crawled_links (page_id, target_url, anchor_text, is_internal)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for link in &page.links {
                link_stmt.execute(params![
                    page_id,
                    link.target_url,
                    link.anchor_text,
                    link.is_internal
                ])?;
            }

            let mut image_stmt = tx.prepare(
                "INSERT INTO crawled_images (page_id, image_url, alt_text, byte_size)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for image in &page.images {
                image_stmt.execute(params![
                    page_id,
                    image.image_url,
                    image.alt_text,
                    image.byte_size.map(to_i64)
                ])?;
            }
        }

        tx.commit()?;
        Ok(Some(page_id))
    }

    fn get_pages(&self, job_id: i64) -> StorageResult<Vec<PageRecord>> {
        let sql = format!(
            "SELECT {} FROM crawled_pages p WHERE p.job_id = ?1 ORDER BY p.id",
            PAGE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let pages = stmt
            .query_map(params![job_id], page_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pages)
    }

    fn list_pages(&self, job_id: i64, window: Pagination) -> StorageResult<Vec<PageSummary>> {
        let sql = format!(
            "SELECT {},
                (SELECT COUNT(*) FROM crawled_links l WHERE l.page_id = p.id),
                (SELECT COUNT(*) FROM crawled_images i WHERE i.page_id = p.id)
             FROM crawled_pages p WHERE p.job_id = ?1
             ORDER BY p.id LIMIT ?2 OFFSET ?3",
            PAGE_COLUMNS
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let pages = stmt
            .query_map(
                params![job_id, window.limit, to_i64(window.offset())],
                |row| {
                    Ok(PageSummary {
                        page: page_from_row(row)?,
                        link_count: to_u64(row.get(PAGE_COLUMN_COUNT)?),
                        image_count: to_u64(row.get(PAGE_COLUMN_COUNT + 1)?),
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(pages)
    }

    fn count_pages(&self, job_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM crawled_pages WHERE job_id = ?1",
            params![job_id],
            |row| row.get(0),
        )?;
        Ok(to_u64(count))
    }

    fn get_links(&self, job_id: i64) -> StorageResult<Vec<LinkRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT l.id, l.page_id, p.url, l.target_url, l.anchor_text, l.is_internal
             FROM crawled_links l JOIN crawled_pages p ON l.page_id = p.id
             WHERE p.job_id = ?1 ORDER BY l.id",
        )?;

        let links = stmt
            .query_map(params![job_id], |row| {
                Ok(LinkRecord {
                    id: row.get(0)?,
                    page_id: row.get(1)?,
                    page_url: row.get(2)?,
                    target_url: row.get(3)?,
                    anchor_text: row.get(4)?,
                    is_internal: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(links)
    }

    fn get_images(
        &self,
        job_id: i64,
        missing_alt_only: bool,
        window: Option<Pagination>,
    ) -> StorageResult<Vec<ImageRecord>> {
        let filter = if missing_alt_only {
            format!("AND {}", MISSING_ALT)
        } else {
            String::new()
        };
        let sql = format!(
            "SELECT i.id, i.page_id, p.url, i.image_url, i.alt_text, i.byte_size
             FROM crawled_images i JOIN crawled_pages p ON i.page_id = p.id
             WHERE p.job_id = ?1 {}
             ORDER BY i.id LIMIT ?2 OFFSET ?3",
            filter
        );

        // SQLite treats a negative LIMIT as "no limit"
        let (limit, offset) = match window {
            Some(w) => (i64::from(w.limit), to_i64(w.offset())),
            None => (-1, 0),
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let images = stmt
            .query_map(params![job_id, limit, offset], image_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(images)
    }

    fn image_stats(&self, job_id: i64) -> StorageResult<ImageStats> {
        let sql = format!(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN {} THEN 1 ELSE 0 END), 0)
             FROM crawled_images i JOIN crawled_pages p ON i.page_id = p.id
             WHERE p.job_id = ?1",
            MISSING_ALT
        );
        let (total, missing): (i64, i64) = self
            .conn
            .query_row(&sql, params![job_id], |row| Ok((row.get(0)?, row.get(1)?)))?;

        Ok(ImageStats {
            total: to_u64(total),
            missing_alt: to_u64(missing),
        })
    }

    fn job_counts(&self, job_id: i64) -> StorageResult<JobCounts> {
        let counts = self.conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM crawled_pages p WHERE p.job_id = ?1),
                (SELECT COUNT(*) FROM crawled_links l
                    JOIN crawled_pages p ON l.page_id = p.id WHERE p.job_id = ?1),
                (SELECT COUNT(*) FROM crawled_images i
                    JOIN crawled_pages p ON i.page_id = p.id WHERE p.job_id = ?1),
                (SELECT COUNT(*) FROM crawl_logs g WHERE g.job_id = ?1)",
            params![job_id],
            |row| {
                Ok(JobCounts {
                    pages: to_u64(row.get(0)?),
                    links: to_u64(row.get(1)?),
                    images: to_u64(row.get(2)?),
                    logs: to_u64(row.get(3)?),
                })
            },
        )?;
        Ok(counts)
    }

    // ===== Logs =====

    fn append_log(&mut self, job_id: i64, level: LogLevel, message: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO crawl_logs (job_id, level, message, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![job_id, level.to_db_string(), message, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_logs(
        &self,
        job_id: i64,
        level: Option<LogLevel>,
        limit: u32,
    ) -> StorageResult<Vec<LogRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, job_id, level, message, created_at FROM crawl_logs
             WHERE job_id = ?1 AND (?2 IS NULL OR level = ?2)
             ORDER BY id DESC LIMIT ?3",
        )?;

        let logs = stmt
            .query_map(
                params![job_id, level.map(|l| l.to_db_string()), limit],
                |row| {
                    Ok(LogRecord {
                        id: row.get(0)?,
                        job_id: row.get(1)?,
                        level: LogLevel::from_db_string(&row.get::<_, String>(2)?)
                            .unwrap_or(LogLevel::Info),
                        message: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(logs)
    }

    // ===== Teardown =====

    fn delete_job(&mut self, job_id: i64) -> StorageResult<bool> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "DELETE FROM crawled_images WHERE page_id IN
                (SELECT id FROM crawled_pages WHERE job_id = ?1)",
            params![job_id],
        )?;
        tx.execute(
            "DELETE FROM crawled_links WHERE page_id IN
                (SELECT id FROM crawled_pages WHERE job_id = ?1)",
            params![job_id],
        )?;
        tx.execute(
            "DELETE FROM crawled_pages WHERE job_id = ?1",
            params![job_id],
        )?;
        tx.execute("DELETE FROM crawl_logs WHERE job_id = ?1", params![job_id])?;
        let deleted = tx.execute("DELETE FROM crawl_jobs WHERE id = ?1", params![job_id])?;

        tx.commit()?;
        Ok(deleted > 0)
    }
}
