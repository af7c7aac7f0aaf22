//! Crawl Lab main entry point
//!
//! This is the command-line interface for the Crawl Lab crawl engine.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use crawl_lab::config::{load_config_with_hash, validate, Config};
use crawl_lab::output::report::{
    format_images, format_job_list, format_job_status, format_logs, format_pages, format_robots,
    format_sitemap,
};
use crawl_lab::output::{format_audit_markdown, ExportFilters, StatusFilter, UrlTypeFilter};
use crawl_lab::storage::Pagination;
use crawl_lab::{CancelOutcome, CrawlOptions, CrawlService, LogLevel, LogQuery};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// How often `crawl --wait` polls the job row
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Crawl Lab: a polite single-site crawler
///
/// Crawls one website breadth-first while respecting robots.txt and a
/// per-job delay, records pages, links and images, and keeps a log for every
/// job.
#[derive(Parser, Debug)]
#[command(name = "crawl-lab")]
#[command(version = "1.0.0")]
#[command(about = "A polite single-site crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a crawl job and run it until it ends
    Crawl {
        url: String,

        /// Page budget (defaults to crawler.max-pages)
        #[arg(long)]
        max_pages: Option<u32>,

        /// Minimum delay between requests in ms (defaults to crawler.delay-ms)
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Print the job status on every poll
        #[arg(long)]
        wait: bool,
    },

    /// Show a job's status and counters
    Status { job_id: i64 },

    /// Show a job's log, most recent first
    Logs {
        job_id: i64,

        /// Only show entries of this level (info, warn, error)
        #[arg(long)]
        level: Option<LogLevel>,

        #[arg(long, default_value_t = crawl_lab::crawler::DEFAULT_LOG_LIMIT)]
        limit: u32,
    },

    /// Cancel a queued or running job
    Cancel { job_id: i64 },

    /// Delete a job and everything it recorded
    Delete { job_id: i64 },

    /// List recent jobs
    Jobs {
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },

    /// List a job's pages
    Pages {
        job_id: i64,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 50)]
        limit: u32,
    },

    /// List a job's images
    Images {
        job_id: i64,

        /// Only images without alt text
        #[arg(long)]
        missing_alt: bool,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 50)]
        limit: u32,
    },

    /// Print an SEO audit of a job as markdown
    Audit {
        job_id: i64,

        /// Write the report to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Export a job's pages as CSV
    Export {
        job_id: i64,

        /// 200, 404, error or 3xx
        #[arg(long)]
        status_filter: Option<StatusFilter>,

        /// product, blog or category
        #[arg(long)]
        url_type: Option<UrlTypeFilter>,

        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Fetch and show a site's robots.txt policy
    Robots { url: String },

    /// Classify the pages listed in a site's sitemaps
    Sitemap { url: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = load(cli.config.as_ref())?;
    let service = CrawlService::new(config).context("Failed to open crawl database")?;

    match cli.command {
        Command::Crawl {
            url,
            max_pages,
            delay_ms,
            wait,
        } => handle_crawl(&service, &url, CrawlOptions { max_pages, delay_ms }, wait).await?,
        Command::Status { job_id } => {
            print!("{}", format_job_status(&service.get_crawl_status(job_id)?));
        }
        Command::Logs {
            job_id,
            level,
            limit,
        } => {
            let logs = service.list_logs(job_id, LogQuery { level, limit })?;
            print!("{}", format_logs(&logs));
        }
        Command::Cancel { job_id } => match service.cancel(job_id)? {
            CancelOutcome::AlreadyTerminal(status) => {
                println!("Job {} already {}", job_id, status);
            }
            CancelOutcome::Requested => println!("Cancellation requested for job {}", job_id),
            CancelOutcome::CancelledDirectly => println!("Job {} cancelled", job_id),
        },
        Command::Delete { job_id } => {
            service.delete_job(job_id).await?;
            println!("Job {} deleted", job_id);
        }
        Command::Jobs { limit } => print!("{}", format_job_list(&service.list_jobs(limit)?)),
        Command::Pages {
            job_id,
            page,
            limit,
        } => {
            let (pages, total) = service.list_pages(job_id, Pagination::new(page, limit))?;
            print!("{}", format_pages(&pages, total));
        }
        Command::Images {
            job_id,
            missing_alt,
            page,
            limit,
        } => {
            let (images, stats) =
                service.list_images(job_id, missing_alt, Pagination::new(page, limit))?;
            print!("{}", format_images(&images, stats));
        }
        Command::Audit { job_id, output } => {
            let markdown = format_audit_markdown(&service.audit(job_id)?);
            write_or_print(output, &markdown)?;
        }
        Command::Export {
            job_id,
            status_filter,
            url_type,
            output,
        } => {
            let filters = ExportFilters {
                status: status_filter,
                url_type,
            };
            write_or_print(output, &service.export_csv(job_id, &filters)?)?;
        }
        Command::Robots { url } => print!("{}", format_robots(&service.fetch_robots_txt(&url).await?)),
        Command::Sitemap { url } => print!("{}", format_sitemap(&service.crawl_sitemap(&url).await?)),
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("crawl_lab=info,warn"),
            1 => EnvFilter::new("crawl_lab=debug,info"),
            2 => EnvFilter::new("crawl_lab=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            Ok(config)
        }
        None => {
            let config = Config::default();
            validate(&config)?;
            Ok(config)
        }
    }
}

/// Starts a job and keeps the process alive until it reaches a terminal status
///
/// The crawl runs in this process, so exiting early would orphan it. Ctrl-C
/// requests cancellation and keeps waiting for the job to stop.
async fn handle_crawl(
    service: &CrawlService,
    url: &str,
    options: CrawlOptions,
    verbose_wait: bool,
) -> anyhow::Result<()> {
    let job_id = service.start_crawl(url, options)?;
    println!("Started job {}", job_id);

    let mut cancel_sent = false;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            result = tokio::signal::ctrl_c(), if !cancel_sent => {
                result.context("Failed to listen for Ctrl-C")?;
                service.cancel(job_id)?;
                cancel_sent = true;
                println!("Cancelling job {}...", job_id);
            }
        }

        let snapshot = service.get_crawl_status(job_id)?;
        if verbose_wait {
            println!(
                "[{}] {} crawled, {} failed, {} skipped",
                snapshot.job.status,
                snapshot.job.pages_crawled,
                snapshot.job.pages_failed,
                snapshot.job.pages_skipped
            );
        }

        if snapshot.job.status.is_terminal() && service.live_jobs() == 0 {
            print!("{}", format_job_status(&snapshot));
            if let Some(error) = snapshot.job.error {
                bail!("Crawl failed: {}", error);
            }
            return Ok(());
        }
    }
}

fn write_or_print(output: Option<PathBuf>, content: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Written to {}", path.display());
        }
        None => print!("{}", content),
    }
    Ok(())
}
