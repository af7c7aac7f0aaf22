//! SEO audit over a finished (or running) crawl
//!
//! The score starts at 100 and loses weighted points per issue. Page issues
//! are weighted by the fraction of pages affected, missing alt text by the
//! fraction of images affected.

use crate::storage::{ImageRecord, JobRecord, LinkRecord, PageRecord};

/// Pages slower than this are reported as slow
pub const SLOW_PAGE_MS: u64 = 3000;

/// Pages with fewer words than this are reported as thin
pub const THIN_CONTENT_WORDS: u32 = 300;

/// Maximum number of image entries listed in the issue details
pub const MAX_IMAGE_DETAILS: usize = 50;

/// Deductions never take the score below `100 - MAX_DEDUCTION`
pub const MAX_DEDUCTION: f64 = 75.0;

const WEIGHT_MISSING_TITLE: f64 = 15.0;
const WEIGHT_MISSING_META: f64 = 10.0;
const WEIGHT_MISSING_H1: f64 = 10.0;
const WEIGHT_MISSING_ALT: f64 = 8.0;
const WEIGHT_SLOW: f64 = 7.0;
const WEIGHT_BROKEN: f64 = 20.0;
const WEIGHT_THIN: f64 = 5.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditTotals {
    pub pages: u64,
    pub images: u64,
    pub links: u64,
    pub internal_links: u64,
    pub external_links: u64,
}

/// Number of pages (or images) affected by each issue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditIssues {
    pub missing_title: u64,
    pub missing_meta_description: u64,
    pub missing_h1: u64,
    pub missing_alt_images: u64,
    pub slow_pages: u64,
    pub broken_pages: u64,
    pub thin_content: u64,
}

/// Offending URLs per issue
#[derive(Debug, Clone, Default)]
pub struct AuditDetails {
    pub missing_title: Vec<String>,
    pub missing_meta_description: Vec<String>,
    pub missing_h1: Vec<String>,
    /// (page URL, load time in ms)
    pub slow_pages: Vec<(String, u64)>,
    /// (page URL, status code)
    pub broken_pages: Vec<(String, u16)>,
    /// (image URL, page URL), capped at [`MAX_IMAGE_DETAILS`]
    pub images_missing_alt: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct AuditReport {
    pub job_id: i64,
    pub url: String,
    pub status: String,
    /// Completion time, or creation time if the job has not finished
    pub crawled_at: String,
    /// 0-100
    pub score: u8,
    pub totals: AuditTotals,
    pub issues: AuditIssues,
    pub details: AuditDetails,
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Builds the audit report for one job's rows
pub fn build_audit(
    job: &JobRecord,
    pages: &[PageRecord],
    links: &[LinkRecord],
    images: &[ImageRecord],
) -> AuditReport {
    let internal_links = links.iter().filter(|l| l.is_internal).count() as u64;
    let totals = AuditTotals {
        pages: pages.len() as u64,
        images: images.len() as u64,
        links: links.len() as u64,
        internal_links,
        external_links: links.len() as u64 - internal_links,
    };

    let mut details = AuditDetails::default();
    let mut issues = AuditIssues::default();

    for page in pages {
        if is_blank(&page.title) {
            issues.missing_title += 1;
            details.missing_title.push(page.url.clone());
        }
        if is_blank(&page.meta_description) {
            issues.missing_meta_description += 1;
            details.missing_meta_description.push(page.url.clone());
        }
        if is_blank(&page.h1) {
            issues.missing_h1 += 1;
            details.missing_h1.push(page.url.clone());
        }
        if page.load_time_ms > SLOW_PAGE_MS {
            issues.slow_pages += 1;
            details.slow_pages.push((page.url.clone(), page.load_time_ms));
        }
        if page.status_code >= 400 {
            issues.broken_pages += 1;
            details.broken_pages.push((page.url.clone(), page.status_code));
        }
        // A zero count means nothing was measured (failed or non-HTML page)
        if page.word_count > 0 && page.word_count < THIN_CONTENT_WORDS {
            issues.thin_content += 1;
        }
    }

    for image in images.iter().filter(|i| i.is_missing_alt()) {
        issues.missing_alt_images += 1;
        if details.images_missing_alt.len() < MAX_IMAGE_DETAILS {
            details
                .images_missing_alt
                .push((image.image_url.clone(), image.page_url.clone()));
        }
    }

    AuditReport {
        job_id: job.id,
        url: job.url.clone(),
        status: job.status.to_string(),
        crawled_at: job
            .completed_at
            .clone()
            .unwrap_or_else(|| job.created_at.clone()),
        score: seo_score(&totals, &issues),
        totals,
        issues,
        details,
    }
}

/// Computes the 0-100 score from issue counts
pub fn seo_score(totals: &AuditTotals, issues: &AuditIssues) -> u8 {
    let mut deductions = 0.0;

    if totals.pages > 0 {
        let pages = totals.pages as f64;
        deductions += issues.missing_title as f64 / pages * WEIGHT_MISSING_TITLE;
        deductions += issues.missing_meta_description as f64 / pages * WEIGHT_MISSING_META;
        deductions += issues.missing_h1 as f64 / pages * WEIGHT_MISSING_H1;
        deductions += issues.broken_pages as f64 / pages * WEIGHT_BROKEN;
        deductions += issues.slow_pages as f64 / pages * WEIGHT_SLOW;
        deductions += issues.thin_content as f64 / pages * WEIGHT_THIN;
    }

    if totals.images > 0 {
        deductions += issues.missing_alt_images as f64 / totals.images as f64 * WEIGHT_MISSING_ALT;
    }

    (100.0 - deductions.min(MAX_DEDUCTION)).round().clamp(0.0, 100.0) as u8
}
