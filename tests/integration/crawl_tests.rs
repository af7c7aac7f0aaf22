//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and drive full crawl
//! jobs through `CrawlService`, checking what ends up in storage.

use crawl_lab::config::Config;
use crawl_lab::crawler::JobSnapshot;
use crawl_lab::storage::{with_storage, JobCounts, LinkRecord, PageRecord};
use crawl_lab::{CancelOutcome, CrawlLabError, CrawlOptions, CrawlService, JobStatus, LogLevel, LogQuery};
use std::collections::HashSet;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with short timeouts and no pacing
fn create_test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.crawler.delay_ms = 0;
    config.crawler.timeout_ms = 2000;
    config.user_agent.crawler_name = "TestBot".to_string();
    config.user_agent.contact_url = "https://example.com/contact".to_string();
    config.output.database_path = dir
        .path()
        .join("crawl.db")
        .to_string_lossy()
        .into_owned();
    config
}

fn create_service(config: Config) -> CrawlService {
    CrawlService::new(config).expect("Failed to create service")
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html")
}

async fn mount_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .mount(server)
        .await;
}

async fn mount_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Polls until the job is terminal and its task has exited
async fn wait_for_terminal(service: &CrawlService, job_id: i64) -> JobSnapshot {
    for _ in 0..200 {
        let snapshot = service.get_crawl_status(job_id).expect("status");
        if snapshot.job.status.is_terminal() && service.live_jobs() == 0 {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("job {} did not finish in time", job_id);
}

fn options(max_pages: u32, delay_ms: u64) -> CrawlOptions {
    CrawlOptions {
        max_pages: Some(max_pages),
        delay_ms: Some(delay_ms),
    }
}

fn pages_of(service: &CrawlService, job_id: i64) -> Vec<PageRecord> {
    with_storage(service.storage(), |s| s.get_pages(job_id)).unwrap()
}

fn links_of(service: &CrawlService, job_id: i64) -> Vec<LinkRecord> {
    with_storage(service.storage(), |s| s.get_links(job_id)).unwrap()
}

fn messages(service: &CrawlService, job_id: i64, level: Option<LogLevel>) -> Vec<String> {
    service
        .list_logs(
            job_id,
            LogQuery {
                level,
                limit: 1000,
            },
        )
        .unwrap()
        .into_iter()
        .map(|log| log.message)
        .collect()
}

#[tokio::test]
async fn test_robots_disallowed_paths_are_recorded_but_not_visited() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_robots(&mock_server, "User-agent: *\nDisallow: /admin").await;
    mount_page(
        &mock_server,
        "/",
        r#"<html><head><title>Home</title></head><body>
        <a href="/blog/a">Blog</a>
        <a href="/admin/x">Admin</a>
        <a href="https://other.com/y">Elsewhere</a>
        </body></html>"#,
    )
    .await;
    mount_page(
        &mock_server,
        "/blog/a",
        "<html><head><title>A</title></head><body>Post</body></html>",
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/admin/x"))
        .respond_with(html("secret"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let service = create_service(create_test_config(&dir));
    let job_id = service.start_crawl(&base_url, options(10, 0)).unwrap();
    let snapshot = wait_for_terminal(&service, job_id).await;

    assert_eq!(snapshot.job.status, JobStatus::Completed);
    assert_eq!(snapshot.job.pages_crawled, 2);
    assert_eq!(snapshot.job.pages_skipped, 1);

    let urls: HashSet<String> = pages_of(&service, job_id)
        .into_iter()
        .map(|p| p.url)
        .collect();
    let expected: HashSet<String> = [format!("{}/", base_url), format!("{}/blog/a", base_url)]
        .into_iter()
        .collect();
    assert_eq!(urls, expected);

    let links = links_of(&service, job_id);
    let admin = links
        .iter()
        .find(|l| l.target_url == format!("{}/admin/x", base_url))
        .expect("admin link recorded");
    assert!(admin.is_internal);
    let external = links
        .iter()
        .find(|l| l.target_url == "https://other.com/y")
        .expect("external link recorded");
    assert!(!external.is_internal);
    assert_eq!(external.anchor_text.as_deref(), Some("Elsewhere"));
}

#[tokio::test]
async fn test_max_pages_one_fetches_only_the_root() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    let links: String = (0..50)
        .map(|i| format!(r#"<a href="/p{}">Page {}</a>"#, i, i))
        .collect();
    mount_page(
        &mock_server,
        "/",
        &format!("<html><head><title>Hub</title></head><body>{}</body></html>", links),
    )
    .await;
    for i in 0..50 {
        Mock::given(method("GET"))
            .and(path(format!("/p{}", i)))
            .respond_with(html("page"))
            .expect(0)
            .mount(&mock_server)
            .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let service = create_service(create_test_config(&dir));
    let job_id = service.start_crawl(&base_url, options(1, 0)).unwrap();
    let snapshot = wait_for_terminal(&service, job_id).await;

    assert_eq!(snapshot.job.status, JobStatus::Completed);
    assert_eq!(snapshot.job.pages_crawled, 1);
    assert_eq!(snapshot.counts.pages, 1);
    assert_eq!(snapshot.counts.links, 50);
    assert!(messages(&service, job_id, None)
        .iter()
        .any(|m| m.contains("Page budget of 1 reached")));
}

#[tokio::test]
async fn test_robots_timeout_falls_back_to_allow_all() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("User-agent: *\nDisallow: /")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;
    mount_page(
        &mock_server,
        "/",
        "<html><head><title>Home</title></head><body>Hello</body></html>",
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&dir);
    config.crawler.timeout_ms = 300;
    let service = create_service(config);

    let job_id = service.start_crawl(&base_url, options(5, 0)).unwrap();
    let snapshot = wait_for_terminal(&service, job_id).await;

    assert_eq!(snapshot.job.status, JobStatus::Completed);
    assert_eq!(snapshot.job.pages_crawled, 1);

    let fallback: Vec<String> = messages(&service, job_id, Some(LogLevel::Info))
        .into_iter()
        .filter(|m| m.contains("robots.txt unavailable"))
        .collect();
    assert_eq!(fallback.len(), 1);
    assert!(messages(&service, job_id, Some(LogLevel::Error)).is_empty());
}

#[tokio::test]
async fn test_cancel_stops_a_running_job() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    let links: String = (0..20).map(|i| format!(r#"<a href="/p{}">P</a>"#, i)).collect();
    mount_page(&mock_server, "/", &format!("<body>{}</body>", links)).await;
    Mock::given(method("GET"))
        .respond_with(html("<html><body>leaf</body></html>"))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let service = create_service(create_test_config(&dir));
    let job_id = service.start_crawl(&base_url, options(50, 200)).unwrap();

    // Let the root page land first
    for _ in 0..100 {
        if service.get_crawl_status(job_id).unwrap().job.pages_crawled >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(service.cancel(job_id).unwrap(), CancelOutcome::Requested);
    let snapshot = wait_for_terminal(&service, job_id).await;
    assert_eq!(snapshot.job.status, JobStatus::Cancelled);
    assert!(snapshot.job.pages_crawled < 21);

    // No rows appear after the transition
    let pages_at_cancel = snapshot.counts.pages;
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(
        service.get_crawl_status(job_id).unwrap().counts.pages,
        pages_at_cancel
    );

    assert!(messages(&service, job_id, Some(LogLevel::Warn))
        .iter()
        .any(|m| m == "Crawl cancelled by user"));
    assert_eq!(
        service.cancel(job_id).unwrap(),
        CancelOutcome::AlreadyTerminal(JobStatus::Cancelled)
    );
}

#[tokio::test]
async fn test_budget_and_uniqueness_with_failed_pages() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        r#"<a href="/a">A</a><a href="/a/">A again</a><a href="/a#top">A top</a>
        <a href="/missing">Missing</a><a href="/b">B</a>"#,
    )
    .await;
    mount_page(&mock_server, "/a", r#"<a href="/">Home</a><a href="/c">C</a>"#).await;
    mount_page(&mock_server, "/b", r#"<a href="/a">A</a><a href="/d">D</a>"#).await;
    mount_page(&mock_server, "/c", "C").await;
    mount_page(&mock_server, "/d", "D").await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let service = create_service(create_test_config(&dir));
    let job_id = service.start_crawl(&base_url, options(4, 0)).unwrap();
    let snapshot = wait_for_terminal(&service, job_id).await;

    assert_eq!(snapshot.job.status, JobStatus::Completed);
    assert!(snapshot.job.pages_crawled + snapshot.job.pages_failed <= 4);
    assert_eq!(snapshot.job.pages_failed, 1);

    let pages = pages_of(&service, job_id);
    let unique: HashSet<&str> = pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(unique.len(), pages.len());
    assert_eq!(pages.len(), 4);

    // Breadth-first: everything linked from the root comes before /c and /d
    let order: Vec<String> = pages
        .iter()
        .map(|p| p.url.trim_start_matches(&base_url).to_string())
        .collect();
    assert_eq!(order, vec!["/", "/a", "/missing", "/b"]);

    let missing = pages.iter().find(|p| p.url.ends_with("/missing")).unwrap();
    assert_eq!(missing.status_code, 404);
    assert!(missing.error_message.is_some());
    assert!(messages(&service, job_id, Some(LogLevel::Warn))
        .iter()
        .any(|m| m.contains("/missing")));
}

#[tokio::test]
async fn test_unreachable_root_fails_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&dir);
    config.crawler.timeout_ms = 500;
    let service = create_service(config);

    let job_id = service
        .start_crawl("http://127.0.0.1:1/", options(5, 0))
        .unwrap();
    let snapshot = wait_for_terminal(&service, job_id).await;

    assert_eq!(snapshot.job.status, JobStatus::Failed);
    assert!(snapshot.job.error.is_some());
    assert_eq!(snapshot.counts.pages, 0);
    assert_eq!(messages(&service, job_id, Some(LogLevel::Error)).len(), 1);
}

#[tokio::test]
async fn test_invalid_request_creates_no_job() {
    let dir = tempfile::tempdir().unwrap();
    let service = create_service(create_test_config(&dir));

    for bad in ["", "   ", "ftp://example.com/", "http://"] {
        assert!(matches!(
            service.start_crawl(bad, CrawlOptions::default()),
            Err(CrawlLabError::InvalidRequest(_))
        ));
    }
    assert!(matches!(
        service.start_crawl("https://example.com", options(20_000, 0)),
        Err(CrawlLabError::InvalidRequest(_))
    ));
    assert!(service.list_jobs(10).unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_removes_everything() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        r#"<html><head><title>Home</title></head><body>
        <img src="/logo.png"><img src="/hero.jpg" alt="Hero">
        <a href="/a">A</a></body></html>"#,
    )
    .await;
    mount_page(&mock_server, "/a", r#"<img src="/a.png"><a href="/">Home</a>"#).await;

    let dir = tempfile::tempdir().unwrap();
    let service = create_service(create_test_config(&dir));
    let job_id = service.start_crawl(&base_url, options(10, 0)).unwrap();
    let snapshot = wait_for_terminal(&service, job_id).await;

    assert_eq!(snapshot.counts.pages, 2);
    assert_eq!(snapshot.counts.images, 3);
    assert!(snapshot.counts.links >= 2);
    assert!(snapshot.counts.logs > 0);

    service.delete_job(job_id).await.unwrap();

    assert!(matches!(
        service.get_crawl_status(job_id),
        Err(CrawlLabError::JobNotFound(_))
    ));
    let counts = with_storage(service.storage(), |s| s.job_counts(job_id)).unwrap();
    assert_eq!(counts, JobCounts::default());

    assert!(matches!(
        service.delete_job(job_id).await,
        Err(CrawlLabError::JobNotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_running_job_cancels_first() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    let links: String = (0..10).map(|i| format!(r#"<a href="/p{}">P</a>"#, i)).collect();
    mount_page(&mock_server, "/", &format!("<body>{}</body>", links)).await;
    Mock::given(method("GET"))
        .respond_with(html("<html><body>leaf</body></html>"))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let service = create_service(create_test_config(&dir));
    let job_id = service.start_crawl(&base_url, options(20, 300)).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    service.delete_job(job_id).await.unwrap();

    assert_eq!(service.live_jobs(), 0);
    assert!(matches!(
        service.get_crawl_status(job_id),
        Err(CrawlLabError::JobNotFound(_))
    ));

    // The stopped task must not write anything afterwards
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(pages_of(&service, job_id).is_empty());
}

#[tokio::test]
async fn test_concurrent_jobs_on_same_target() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    mount_page(&mock_server, "/", "<html><body>Only page</body></html>").await;

    let dir = tempfile::tempdir().unwrap();
    let service = create_service(create_test_config(&dir));
    let first = service.start_crawl(&base_url, options(5, 0)).unwrap();
    let second = service.start_crawl(&base_url, options(5, 0)).unwrap();
    assert_ne!(first, second);

    let first = wait_for_terminal(&service, first).await;
    let second = wait_for_terminal(&service, second).await;
    assert_eq!(first.job.status, JobStatus::Completed);
    assert_eq!(second.job.status, JobStatus::Completed);
    assert_eq!(first.counts.pages, 1);
    assert_eq!(second.counts.pages, 1);
}

#[tokio::test]
async fn test_huge_crawl_delay_is_clamped() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_robots(&mock_server, "User-agent: *\nCrawl-delay: 1e20").await;
    mount_page(
        &mock_server,
        "/",
        "<html><head><title>Home</title></head><body>Hello</body></html>",
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&dir);
    config.crawler.use_sitemap = false;
    let service = create_service(config);

    let job_id = service.start_crawl(&base_url, options(5, 0)).unwrap();
    let snapshot = wait_for_terminal(&service, job_id).await;

    assert_eq!(snapshot.job.status, JobStatus::Completed);
    assert_eq!(snapshot.job.pages_crawled, 1);
    assert!(messages(&service, job_id, Some(LogLevel::Info))
        .iter()
        .any(|m| m == "Using robots.txt crawl-delay of 60000 ms"));
}

#[tokio::test]
async fn test_redirect_into_disallowed_path_is_not_fetched() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_robots(&mock_server, "User-agent: *\nDisallow: /admin").await;
    mount_page(&mock_server, "/", r#"<a href="/go">Go</a>"#).await;
    Mock::given(method("GET"))
        .and(path("/go"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", format!("{}/admin/secret", base_url).as_str()),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/secret"))
        .respond_with(html("<html><head><title>SECRET</title></head></html>"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let service = create_service(create_test_config(&dir));
    let job_id = service.start_crawl(&base_url, options(10, 0)).unwrap();
    let snapshot = wait_for_terminal(&service, job_id).await;

    assert_eq!(snapshot.job.status, JobStatus::Completed);
    assert_eq!(snapshot.job.pages_crawled, 1);
    assert_eq!(snapshot.job.pages_skipped, 1);

    let pages = pages_of(&service, job_id);
    assert_eq!(pages.len(), 1);
    assert!(pages.iter().all(|p| {
        !p.url.contains("/admin") && !p.final_url.as_deref().unwrap_or("").contains("/admin")
    }));
    assert!(messages(&service, job_id, Some(LogLevel::Info))
        .iter()
        .any(|m| m.contains("disallowed by robots.txt")));
}

#[tokio::test]
async fn test_sitemap_urls_seed_the_frontier() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        "<html><head><title>Home</title></head><body>No links here</body></html>",
    )
    .await;
    mount_page(
        &mock_server,
        "/hidden",
        "<html><head><title>Hidden</title></head><body>Only in the sitemap</body></html>",
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!(
                r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
                <url><loc>{0}/</loc></url><url><loc>{0}/hidden</loc></url>
                </urlset>"#,
                base_url
            ),
            "application/xml",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let service = create_service(create_test_config(&dir));
    let job_id = service.start_crawl(&base_url, options(10, 0)).unwrap();
    let snapshot = wait_for_terminal(&service, job_id).await;

    assert_eq!(snapshot.job.status, JobStatus::Completed);
    assert_eq!(snapshot.job.pages_crawled, 2);

    let pages = pages_of(&service, job_id);
    let order: Vec<String> = pages
        .iter()
        .map(|p| p.url.trim_start_matches(&base_url).to_string())
        .collect();
    assert_eq!(order, vec!["/", "/hidden"]);
    assert_eq!(pages[1].title.as_deref(), Some("Hidden"));
    assert_eq!(pages[1].depth, 1);

    let info = messages(&service, job_id, Some(LogLevel::Info));
    assert!(info.iter().any(|m| m == "Found 2 URLs in sitemap"));
    assert!(info.iter().any(|m| m == "Queued 1 of 2 sitemap URLs"));
}

#[tokio::test]
async fn test_large_download_is_recorded_from_headers() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(&mock_server, "/", r#"<a href="/report.pdf">Report</a>"#).await;
    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(vec![b'%'; 3_000_000], "application/pdf"),
        )
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let service = create_service(create_test_config(&dir));
    let job_id = service.start_crawl(&base_url, options(10, 0)).unwrap();
    let snapshot = wait_for_terminal(&service, job_id).await;

    assert_eq!(snapshot.job.status, JobStatus::Completed);
    let report = pages_of(&service, job_id)
        .into_iter()
        .find(|p| p.url.ends_with("/report.pdf"))
        .expect("download recorded");
    assert_eq!(report.status_code, 200);
    assert_eq!(report.content_type.as_deref(), Some("application/pdf"));
    assert_eq!(report.content_length, 3_000_000);
    assert_eq!(report.word_count, 0);
}
