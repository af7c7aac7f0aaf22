//! Output module for reports and exports built from stored crawl data
//!
//! This module handles:
//! - The SEO audit and its score
//! - CSV export of crawled pages
//! - Text and markdown rendering for the CLI

mod audit;
mod csv;
pub mod report;

pub use audit::{
    build_audit, seo_score, AuditDetails, AuditIssues, AuditReport, AuditTotals, MAX_IMAGE_DETAILS,
    SLOW_PAGE_MS, THIN_CONTENT_WORDS,
};
pub use csv::{export_csv, ExportFilters, StatusFilter, UrlTypeFilter, CSV_HEADER};
pub use report::format_audit_markdown;
