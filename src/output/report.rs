//! Human-readable rendering of service results
//!
//! The CLI prints these; the audit report is markdown so it can be saved and
//! shared as-is.

use crate::crawler::JobSnapshot;
use crate::output::audit::AuditReport;
use crate::robots::{RobotsPolicy, RuleKind};
use crate::sitemap::SitemapPageResult;
use crate::storage::{ImageRecord, ImageStats, JobSummary, LogRecord, PageSummary};
use std::fmt::Write;

/// Formats the status of one job
pub fn format_job_status(snapshot: &JobSnapshot) -> String {
    let job = &snapshot.job;
    let mut out = String::new();

    let _ = writeln!(out, "Job {} - {}", job.id, job.url);
    let _ = writeln!(out, "  Status:    {}", job.status);
    let _ = writeln!(
        out,
        "  Budget:    {} pages, {} ms delay, {} ms timeout",
        job.max_pages, job.delay_ms, job.timeout_ms
    );
    let _ = writeln!(
        out,
        "  Progress:  {} crawled, {} failed, {} skipped",
        job.pages_crawled, job.pages_failed, job.pages_skipped
    );
    let _ = writeln!(
        out,
        "  Rows:      {} pages, {} links, {} images, {} log entries",
        snapshot.counts.pages, snapshot.counts.links, snapshot.counts.images, snapshot.counts.logs
    );
    let _ = writeln!(out, "  Created:   {}", job.created_at);
    if let Some(started) = &job.started_at {
        let _ = writeln!(out, "  Started:   {}", started);
    }
    if let Some(completed) = &job.completed_at {
        let _ = writeln!(out, "  Completed: {}", completed);
    }
    if let Some(error) = &job.error {
        let _ = writeln!(out, "  Error:     {}", error);
    }

    out
}

pub fn format_job_list(jobs: &[JobSummary]) -> String {
    if jobs.is_empty() {
        return "No crawl jobs\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "{:>6}  {:<10}  {:>6}  {:>6}  {:>6}  URL", "ID", "STATUS", "PAGES", "LINKS", "IMAGES");
    for summary in jobs {
        let _ = writeln!(
            out,
            "{:>6}  {:<10}  {:>6}  {:>6}  {:>6}  {}",
            summary.job.id,
            summary.job.status.to_string(),
            summary.counts.pages,
            summary.counts.links,
            summary.counts.images,
            summary.job.url
        );
    }
    out
}

pub fn format_logs(logs: &[LogRecord]) -> String {
    let mut out = String::new();
    for log in logs {
        let _ = writeln!(
            out,
            "{} [{:<5}] {}",
            log.created_at,
            log.level.to_string().to_uppercase(),
            log.message
        );
    }
    out
}

pub fn format_pages(pages: &[PageSummary], total: u64) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Showing {} of {} pages\n", pages.len(), total);
    for summary in pages {
        let page = &summary.page;
        let _ = writeln!(
            out,
            "[{}] {} ({} links, {} images, {} words, {} ms)",
            page.status_code,
            page.url,
            summary.link_count,
            summary.image_count,
            page.word_count,
            page.load_time_ms
        );
        if let Some(title) = &page.title {
            let _ = writeln!(out, "      {}", title);
        }
        if let Some(error) = &page.error_message {
            let _ = writeln!(out, "      error: {}", error);
        }
    }
    out
}

pub fn format_images(images: &[ImageRecord], stats: ImageStats) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} images, {} missing alt text\n",
        stats.total, stats.missing_alt
    );
    for image in images {
        let alt = image.alt_text.as_deref().unwrap_or("(missing)");
        let _ = writeln!(out, "{}\n      on {}\n      alt: {}", image.image_url, image.page_url, alt);
    }
    out
}

/// Formats the parsed robots.txt policy
pub fn format_robots(policy: &RobotsPolicy) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Agent:      {}", policy.agent());
    let _ = writeln!(out, "Fetched at: {}", policy.fetched_at().to_rfc3339());
    if let Some(reason) = policy.fallback_reason() {
        let _ = writeln!(out, "Fallback:   {} (everything allowed)", reason);
    }
    match policy.crawl_delay() {
        Some(delay) => {
            let _ = writeln!(out, "Crawl-delay: {} ms", delay.as_millis());
        }
        None => {
            let _ = writeln!(out, "Crawl-delay: none");
        }
    }

    for group in policy.groups() {
        let _ = writeln!(out, "\nUser-agent: {}", group.agents.join(", "));
        for rule in &group.rules {
            let kind = match rule.kind {
                RuleKind::Allow => "Allow",
                RuleKind::Disallow => "Disallow",
            };
            let _ = writeln!(out, "  {}: {}", kind, rule.path);
        }
    }

    if !policy.sitemaps().is_empty() {
        let _ = writeln!(out, "\nSitemaps:");
        for sitemap in policy.sitemaps() {
            let _ = writeln!(out, "  - {}", sitemap);
        }
    }

    out
}

pub fn format_sitemap(results: &[SitemapPageResult]) -> String {
    if results.is_empty() {
        return "No sitemap URLs found\n".to_string();
    }

    let mut out = String::new();
    for result in results {
        let signal = result.signal.as_deref().unwrap_or("-");
        let _ = writeln!(out, "{:<9} {:<28} {}", result.page_type.as_str(), signal, result.url);
    }
    out
}

/// Formats an audit report as markdown
pub fn format_audit_markdown(report: &AuditReport) -> String {
    let mut md = String::new();

    md.push_str("# SEO Audit\n\n");

    md.push_str("## Job\n\n");
    md.push_str(&format!("- **Job ID**: {}\n", report.job_id));
    md.push_str(&format!("- **URL**: {}\n", report.url));
    md.push_str(&format!("- **Status**: {}\n", report.status));
    md.push_str(&format!("- **Crawled**: {}\n\n", report.crawled_at));

    md.push_str(&format!("## Score: {}/100\n\n", report.score));

    md.push_str("## Totals\n\n");
    md.push_str("| Metric | Count |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| Pages | {} |\n", report.totals.pages));
    md.push_str(&format!("| Images | {} |\n", report.totals.images));
    md.push_str(&format!("| Links | {} |\n", report.totals.links));
    md.push_str(&format!("| Internal links | {} |\n", report.totals.internal_links));
    md.push_str(&format!("| External links | {} |\n\n", report.totals.external_links));

    md.push_str("## Issues\n\n");
    md.push_str("| Issue | Count |\n");
    md.push_str("|-------|-------|\n");
    md.push_str(&format!("| Missing title | {} |\n", report.issues.missing_title));
    md.push_str(&format!(
        "| Missing meta description | {} |\n",
        report.issues.missing_meta_description
    ));
    md.push_str(&format!("| Missing H1 | {} |\n", report.issues.missing_h1));
    md.push_str(&format!(
        "| Images missing alt | {} |\n",
        report.issues.missing_alt_images
    ));
    md.push_str(&format!("| Slow pages | {} |\n", report.issues.slow_pages));
    md.push_str(&format!("| Broken pages | {} |\n", report.issues.broken_pages));
    md.push_str(&format!("| Thin content | {} |\n\n", report.issues.thin_content));

    let details = &report.details;
    push_url_section(&mut md, "Pages Missing a Title", &details.missing_title);
    push_url_section(
        &mut md,
        "Pages Missing a Meta Description",
        &details.missing_meta_description,
    );
    push_url_section(&mut md, "Pages Missing an H1", &details.missing_h1);

    if !details.broken_pages.is_empty() {
        md.push_str("## Broken Pages\n\n");
        md.push_str("| URL | Status |\n");
        md.push_str("|-----|--------|\n");
        for (url, status) in &details.broken_pages {
            md.push_str(&format!("| {} | {} |\n", url, status));
        }
        md.push('\n');
    }

    if !details.slow_pages.is_empty() {
        md.push_str("## Slow Pages\n\n");
        md.push_str("| URL | Load time (ms) |\n");
        md.push_str("|-----|----------------|\n");
        for (url, load_time) in &details.slow_pages {
            md.push_str(&format!("| {} | {} |\n", url, load_time));
        }
        md.push('\n');
    }

    if !details.images_missing_alt.is_empty() {
        md.push_str("## Images Missing Alt Text\n\n");
        md.push_str("| Image | Page |\n");
        md.push_str("|-------|------|\n");
        for (image_url, page_url) in &details.images_missing_alt {
            md.push_str(&format!("| {} | {} |\n", image_url, page_url));
        }
        md.push('\n');
    }

    md
}

fn push_url_section(md: &mut String, title: &str, urls: &[String]) {
    if urls.is_empty() {
        return;
    }

    md.push_str(&format!("## {}\n\n", title));
    for url in urls {
        md.push_str(&format!("- {}\n", url));
    }
    md.push('\n');
}
