//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Crawl Lab database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per crawl job
CREATE TABLE IF NOT EXISTS crawl_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    status TEXT NOT NULL,
    max_pages INTEGER NOT NULL,
    delay_ms INTEGER NOT NULL,
    timeout_ms INTEGER NOT NULL,
    pages_crawled INTEGER NOT NULL DEFAULT 0,
    pages_failed INTEGER NOT NULL DEFAULT 0,
    pages_skipped INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_crawl_jobs_status ON crawl_jobs(status);

-- Pages fetched (or failed) by a job; one row per normalized URL
CREATE TABLE IF NOT EXISTS crawled_pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER NOT NULL REFERENCES crawl_jobs(id),
    url TEXT NOT NULL,
    final_url TEXT,
    status_code INTEGER NOT NULL,
    title TEXT,
    meta_description TEXT,
    h1 TEXT,
    content_type TEXT,
    word_count INTEGER NOT NULL DEFAULT 0,
    content_length INTEGER NOT NULL DEFAULT 0,
    load_time_ms INTEGER NOT NULL DEFAULT 0,
    depth INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    crawled_at TEXT NOT NULL,
    UNIQUE(job_id, url)
);

CREATE INDEX IF NOT EXISTS idx_crawled_pages_job ON crawled_pages(job_id);

-- Outbound links found on a page
CREATE TABLE IF NOT EXISTS crawled_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL REFERENCES crawled_pages(id),
    target_url TEXT NOT NULL,
    anchor_text TEXT,
    is_internal INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawled_links_page ON crawled_links(page_id);

-- Images found on a page
CREATE TABLE IF NOT EXISTS crawled_images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL REFERENCES crawled_pages(id),
    image_url TEXT NOT NULL,
    alt_text TEXT,
    byte_size INTEGER
);

CREATE INDEX IF NOT EXISTS idx_crawled_images_page ON crawled_images(page_id);

-- Append-only audit trail per job
CREATE TABLE IF NOT EXISTS crawl_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER NOT NULL REFERENCES crawl_jobs(id),
    level TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_logs_job ON crawl_logs(job_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
