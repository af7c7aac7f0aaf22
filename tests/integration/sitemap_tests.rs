//! Integration tests for sitemap discovery and page classification

use crawl_lab::config::Config;
use crawl_lab::sitemap::PageType;
use crawl_lab::CrawlService;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_service(dir: &TempDir, max_pages: u32) -> CrawlService {
    let mut config = Config::default();
    config.crawler.timeout_ms = 2000;
    config.user_agent.crawler_name = "TestBot".to_string();
    config.sitemap.delay_ms = 0;
    config.sitemap.max_pages = max_pages;
    config.output.database_path = dir
        .path()
        .join("crawl.db")
        .to_string_lossy()
        .into_owned();
    CrawlService::new(config).expect("Failed to create service")
}

async fn mount_xml(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/xml"))
        .mount(server)
        .await;
}

fn urlset(base: &str, paths: &[&str]) -> String {
    let entries: String = paths
        .iter()
        .map(|p| format!("<url><loc>{}{}</loc></url>", base, p))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{}</urlset>"#,
        entries
    )
}

#[tokio::test]
async fn test_sitemap_index_is_expanded_and_deduplicated() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("User-agent: *\nSitemap: {}/sitemap_index.xml", base)),
        )
        .mount(&mock_server)
        .await;

    mount_xml(
        &mock_server,
        "/sitemap_index.xml",
        format!(
            r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
            <sitemap><loc>{0}/post-sitemap.xml</loc></sitemap>
            <sitemap><loc>{0}/page-sitemap.xml</loc></sitemap>
            </sitemapindex>"#,
            base
        ),
    )
    .await;
    mount_xml(
        &mock_server,
        "/post-sitemap.xml",
        urlset(&base, &["/blog/a", "/blog/b", "/wp-content/uploads/x.jpg"]),
    )
    .await;
    mount_xml(
        &mock_server,
        "/page-sitemap.xml",
        urlset(&base, &["/", "/blog/a", "/team", "/contact"]),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/team"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html><body><article><h1>Meet the team</h1></article></body></html>",
            "text/html",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let service = create_service(&dir, 50);
    let results = service.crawl_sitemap(&base).await.unwrap();

    let urls: Vec<String> = results
        .iter()
        .map(|r| r.url.trim_start_matches(&base).to_string())
        .collect();
    assert_eq!(urls, vec!["/blog/a", "/blog/b", "/", "/team", "/contact"]);

    let types: Vec<PageType> = results.iter().map(|r| r.page_type).collect();
    assert_eq!(
        types,
        vec![
            PageType::Blog,
            PageType::Blog,
            PageType::Home,
            PageType::Blog,
            PageType::Contact
        ]
    );
    assert_eq!(results[0].signal.as_deref(), Some("url:blog"));
    assert_eq!(results[3].signal.as_deref(), Some("content:article"));
}

#[tokio::test]
async fn test_falls_back_to_well_known_locations() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();

    // No robots.txt and no /sitemap.xml: wiremock answers 404 for both
    mount_xml(
        &mock_server,
        "/sitemap_index.xml",
        urlset(&base, &["/products/shoe", "/services/seo"]),
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let service = create_service(&dir, 50);
    let results = service.crawl_sitemap(&base).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].page_type, PageType::Product);
    assert_eq!(results[1].page_type, PageType::Service);
}

#[tokio::test]
async fn test_unmatched_url_without_content_is_other() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();

    mount_xml(&mock_server, "/sitemap.xml", urlset(&base, &["/team"])).await;
    Mock::given(method("GET"))
        .and(path("/team"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let service = create_service(&dir, 50);
    let results = service.crawl_sitemap(&base).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].page_type, PageType::Other);
    assert_eq!(results[0].signal, None);
}

#[tokio::test]
async fn test_result_count_is_capped() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();

    mount_xml(
        &mock_server,
        "/sitemap.xml",
        urlset(&base, &["/blog/1", "/blog/2", "/blog/3", "/blog/4"]),
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let service = create_service(&dir, 2);
    let results = service.crawl_sitemap(&base).await.unwrap();

    assert_eq!(results.len(), 2);
    assert!(results[1].url.ends_with("/blog/2"));
}

#[tokio::test]
async fn test_site_without_sitemap_yields_nothing() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();

    let dir = tempfile::tempdir().unwrap();
    let service = create_service(&dir, 50);
    assert!(service.crawl_sitemap(&base).await.unwrap().is_empty());
}

fn sitemap_index(children: &[String]) -> String {
    let entries: String = children
        .iter()
        .map(|c| format!("<sitemap><loc>{}</loc></sitemap>", c))
        .collect();
    format!(
        r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{}</sitemapindex>"#,
        entries
    )
}

async fn requests_to(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == route)
        .count()
}

#[tokio::test]
async fn test_self_referencing_index_is_fetched_once() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();

    mount_xml(
        &mock_server,
        "/sitemap.xml",
        sitemap_index(&[
            format!("{}/sitemap.xml", base),
            format!("{}/pages.xml", base),
            format!("{}/sitemap.xml", base),
        ]),
    )
    .await;
    mount_xml(&mock_server, "/pages.xml", urlset(&base, &["/blog/a"])).await;

    let dir = tempfile::tempdir().unwrap();
    let service = create_service(&dir, 50);
    let results = service.crawl_sitemap(&base).await.unwrap();

    assert_eq!(results.len(), 1);
    assert!(results[0].url.ends_with("/blog/a"));
    assert_eq!(requests_to(&mock_server, "/sitemap.xml").await, 1);
    assert_eq!(requests_to(&mock_server, "/pages.xml").await, 1);
}

#[tokio::test]
async fn test_index_cycle_terminates() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();

    mount_xml(
        &mock_server,
        "/sitemap.xml",
        sitemap_index(&[format!("{}/a.xml", base)]),
    )
    .await;
    mount_xml(
        &mock_server,
        "/a.xml",
        sitemap_index(&[format!("{}/b.xml", base), format!("{}/pages.xml", base)]),
    )
    .await;
    mount_xml(
        &mock_server,
        "/b.xml",
        sitemap_index(&[format!("{}/sitemap.xml", base), format!("{}/a.xml", base)]),
    )
    .await;
    mount_xml(&mock_server, "/pages.xml", urlset(&base, &["/contact"])).await;

    let dir = tempfile::tempdir().unwrap();
    let service = create_service(&dir, 50);
    let results = service.crawl_sitemap(&base).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].page_type, PageType::Contact);
    for route in ["/sitemap.xml", "/a.xml", "/b.xml", "/pages.xml"] {
        assert_eq!(requests_to(&mock_server, route).await, 1, "{}", route);
    }
}

#[tokio::test]
async fn test_nested_indexes_stop_at_depth_limit() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();

    // depth 0 -> 1 -> 2 -> 3; with max-depth 2 the index at depth 2 is read
    // but its children are not followed
    mount_xml(
        &mock_server,
        "/sitemap.xml",
        sitemap_index(&[format!("{}/level1.xml", base)]),
    )
    .await;
    mount_xml(
        &mock_server,
        "/level1.xml",
        sitemap_index(&[format!("{}/level2.xml", base), format!("{}/pages.xml", base)]),
    )
    .await;
    mount_xml(
        &mock_server,
        "/level2.xml",
        sitemap_index(&[format!("{}/level3.xml", base)]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/level3.xml"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(urlset(&base, &["/blog/deep"]), "application/xml"),
        )
        .expect(0)
        .mount(&mock_server)
        .await;
    mount_xml(&mock_server, "/pages.xml", urlset(&base, &["/about"])).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.sitemap.max_depth = 2;
    config.sitemap.delay_ms = 0;
    config.crawler.timeout_ms = 2000;
    config.output.database_path = dir.path().join("crawl.db").to_string_lossy().into_owned();
    let service = CrawlService::new(config).unwrap();

    let results = service.crawl_sitemap(&base).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].page_type, PageType::About);
    assert_eq!(requests_to(&mock_server, "/level2.xml").await, 1);
}

#[tokio::test]
async fn test_document_count_is_capped() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();

    let children: Vec<String> = (0..30).map(|i| format!("{}/part-{}.xml", base, i)).collect();
    mount_xml(&mock_server, "/sitemap.xml", sitemap_index(&children)).await;
    for i in 0..30 {
        let page = format!("/blog/{}", i);
        mount_xml(
            &mock_server,
            &format!("/part-{}.xml", i),
            urlset(&base, &[page.as_str()]),
        )
        .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let service = create_service(&dir, 50);
    let results = service.crawl_sitemap(&base).await.unwrap();

    // The index plus 24 children make 25 documents
    let parts = mock_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().starts_with("/part-"))
        .count();
    assert_eq!(parts, 24);
    assert_eq!(results.len(), 24);
    assert!(results.iter().all(|r| r.page_type == PageType::Blog));
}
