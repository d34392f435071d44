//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end.

use jobcrawl::config::{
    Config, CrawlerConfig, FetcherConfig, OutputConfig, PolitenessConfig, SiteConfig,
};
use jobcrawl::crawler::{crawl, Coordinator, Fetcher, FetchResult};
use jobcrawl::state::CrawlState;
use jobcrawl::storage::{BackfillScope, DedupStore, SqliteStore};
use jobcrawl::FilterSpec;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing every endpoint at the mock server
fn create_test_config(server: &MockServer, db_path: &Path, backfill_on_start: bool) -> Config {
    let base = server.uri();
    Config {
        fetcher: FetcherConfig {
            timeout_ms: 2_000,
            max_attempts: 1,
            retry_backoff_ms: 0,
            ..Default::default()
        },
        politeness: PolitenessConfig {
            enabled: false,
            ..Default::default()
        },
        crawler: CrawlerConfig {
            backfill_on_start,
            ..Default::default()
        },
        site: SiteConfig {
            api_url: format!("{}/api/search", base),
            browser_url: format!("{}/search", base),
            detail_url: format!("{}/api/job", base),
        },
        output: OutputConfig {
            database_path: db_path.display().to_string(),
            archive_dir: None,
        },
    }
}

fn search_page(num_pages: u32, page: u32, total_hits: u32, keys: &[&str]) -> Value {
    let documents: Vec<Value> = keys
        .iter()
        .map(|key| {
            json!({
                "job_id": key,
                "title": format!("Job {}", key),
                "company_name": "Acme AG",
                "place": "Zürich",
                "_links": {"detail_en": {"href": format!("https://jobs.example/en/{}", key)}}
            })
        })
        .collect();

    json!({
        "num_pages": num_pages,
        "current_page": page,
        "total_hits": total_hits,
        "documents": documents
    })
}

/// Mounts a response for `page=<page>`; must be mounted before the first page
async fn mount_page(server: &MockServer, page: u32, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/api/search"))
        .and(query_param("page", page.to_string()))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Mounts the response for any search request not matched by a page mock
async fn mount_first_page(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/api/search"))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn mount_details(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/job/\w+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "template_text": "<p>Full description</p>",
            "application_url": "https://apply.example.com",
            "is_active": true
        })))
        .mount(server)
        .await;
}

fn python_filter() -> FilterSpec {
    FilterSpec {
        term: Some("Python".to_string()),
        location: Some("Switzerland".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_full_crawl_deduplicates_across_pages() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        2,
        ResponseTemplate::new(200).set_body_json(search_page(3, 2, 42, &["c", "d", "e"])),
    )
    .await;
    mount_page(
        &server,
        3,
        ResponseTemplate::new(200).set_body_json(search_page(3, 3, 42, &["e", "f"])),
    )
    .await;
    mount_first_page(
        &server,
        ResponseTemplate::new(200).set_body_json(search_page(3, 1, 42, &["a", "b", "c"])),
    )
    .await;
    mount_details(&server).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crawl.db");
    let config = create_test_config(&server, &db_path, true);

    let store = Arc::new(SqliteStore::new(&db_path).unwrap());
    let coordinator = Coordinator::new(config, store.clone()).unwrap();

    let request_id = coordinator.start(&python_filter()).await.unwrap();

    let request = store.get_request(request_id).unwrap();
    assert_eq!(request.state, CrawlState::Done);
    assert_eq!(request.num_pages, Some(3));
    assert_eq!(request.total_hits, Some(42));
    assert_eq!(request.status, Some(200));
    assert!(request.url_api.contains("location=Switzerland"));
    assert!(request.url_api.contains("query=Python"));
    assert!(!request.url_api.contains("publication-date"));

    // Page 1 is the request itself
    let pages = store.page_requests(request_id).unwrap();
    assert_eq!(pages.len(), 2);
    assert!(pages.iter().all(|p| p.status == Some(200)));

    // Distinct keys across all three pages: a b c d e f
    assert_eq!(store.count_jobs(request_id).unwrap(), 6);
    assert_eq!(request.duplicates, 2);

    let job = store.get_job("d").unwrap().unwrap();
    assert_eq!(job.status, Some(200));
    assert_eq!(job.detail.description.as_deref(), Some("<p>Full description</p>"));
    assert_eq!(job.stub.url_en.as_deref(), Some("https://jobs.example/en/d"));
    assert_eq!(job.page_request_id, Some(pages[0].id));

    let first_page_job = store.get_job("a").unwrap().unwrap();
    assert_eq!(first_page_job.page_request_id, None);

    let progress = coordinator.status(request_id).unwrap();
    assert_eq!(progress.pages_done, 3);
    assert_eq!(progress.jobs_found, 6);
    assert_eq!(progress.jobs_backfilled, 6);
}

#[tokio::test]
async fn test_fan_out_creates_page_requests() {
    let server = MockServer::start().await;
    for page in 2..=5 {
        mount_page(
            &server,
            page,
            ResponseTemplate::new(200).set_body_json(search_page(5, page, 100, &[])),
        )
        .await;
    }
    mount_first_page(
        &server,
        ResponseTemplate::new(200).set_body_json(search_page(5, 1, 100, &[])),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crawl.db");
    let config = create_test_config(&server, &db_path, false);

    let request_id = crawl(config, &python_filter()).await.unwrap();

    let store = SqliteStore::new(&db_path).unwrap();
    let pages = store.page_requests(request_id).unwrap();
    assert_eq!(pages.len(), 4);
    for (page, expected) in pages.iter().zip(2..=5u32) {
        assert_eq!(page.page, expected);
        assert!(page.url_api.ends_with(&format!("page={}", expected)));
    }

    assert_eq!(
        store.get_request(request_id).unwrap().state,
        CrawlState::PagesDone
    );
}

#[tokio::test]
async fn test_resume_fetches_only_pending_pages() {
    let server = MockServer::start().await;
    mount_page(&server, 2, ResponseTemplate::new(503)).await;
    mount_page(
        &server,
        3,
        ResponseTemplate::new(200).set_body_json(search_page(3, 3, 30, &["c"])),
    )
    .await;
    mount_first_page(
        &server,
        ResponseTemplate::new(200).set_body_json(search_page(3, 1, 30, &["a"])),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crawl.db");
    let config = create_test_config(&server, &db_path, false);

    let store = Arc::new(SqliteStore::new(&db_path).unwrap());
    let coordinator = Coordinator::new(config, store.clone()).unwrap();
    let request_id = coordinator.start(&python_filter()).await.unwrap();

    // The soft-failed page keeps the request in Paging
    assert_eq!(
        store.get_request(request_id).unwrap().state,
        CrawlState::Paging
    );
    let pending = store.pending_page_requests(request_id).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].page, 2);

    // Only page 2 may be fetched again
    server.reset().await;
    mount_page(
        &server,
        2,
        ResponseTemplate::new(200).set_body_json(search_page(3, 2, 30, &["b"])),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/api/search"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    mount_details(&server).await;

    let state = coordinator.resume(request_id).await.unwrap();

    assert_eq!(state, CrawlState::Done);
    assert!(store.pending_page_requests(request_id).unwrap().is_empty());
    assert_eq!(store.count_jobs(request_id).unwrap(), 3);
    assert_eq!(store.count_backfilled_jobs(request_id).unwrap(), 3);
}

#[tokio::test]
async fn test_start_ignores_filter_page() {
    let server = MockServer::start().await;
    for page in 2..=3 {
        mount_page(
            &server,
            page,
            ResponseTemplate::new(200).set_body_json(search_page(3, page, 30, &[])),
        )
        .await;
    }
    mount_first_page(
        &server,
        ResponseTemplate::new(200).set_body_json(search_page(3, 1, 30, &[])),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crawl.db");
    let config = create_test_config(&server, &db_path, false);

    let store = Arc::new(SqliteStore::new(&db_path).unwrap());
    let coordinator = Coordinator::new(config, store.clone()).unwrap();
    let filter = FilterSpec {
        term: Some("rust".to_string()),
        page: 2,
        ..Default::default()
    };
    let request_id = coordinator.start(&filter).await.unwrap();

    let page_values = |url: &str| -> Vec<String> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .filter(|(key, _)| key == "page")
            .map(|(_, value)| value.into_owned())
            .collect()
    };

    let request = store.get_request(request_id).unwrap();
    assert!(page_values(&request.url_api).is_empty());

    let pages = store.page_requests(request_id).unwrap();
    assert_eq!(pages.len(), 2);
    for page in &pages {
        assert_eq!(page_values(&page.url_api), vec![page.page.to_string()]);
    }
    assert_eq!(request.state, CrawlState::PagesDone);
}

#[tokio::test]
async fn test_rejected_page_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/search"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(
        &server,
        3,
        ResponseTemplate::new(200).set_body_json(search_page(3, 3, 30, &["c"])),
    )
    .await;
    mount_first_page(
        &server,
        ResponseTemplate::new(200).set_body_json(search_page(3, 1, 30, &["a"])),
    )
    .await;
    mount_details(&server).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crawl.db");
    let config = create_test_config(&server, &db_path, true);

    let store = Arc::new(SqliteStore::new(&db_path).unwrap());
    let coordinator = Coordinator::new(config, store.clone()).unwrap();
    let request_id = coordinator.start(&python_filter()).await.unwrap();

    assert_eq!(
        store.get_request(request_id).unwrap().state,
        CrawlState::Done
    );
    let statuses: Vec<(u32, Option<u16>)> = store
        .page_requests(request_id)
        .unwrap()
        .iter()
        .map(|page| (page.page, page.status))
        .collect();
    assert_eq!(statuses, vec![(2, Some(404)), (3, Some(200))]);
    assert!(store.pending_page_requests(request_id).unwrap().is_empty());

    // The 404 page is not fetched again
    assert_eq!(
        coordinator.resume(request_id).await.unwrap(),
        CrawlState::Done
    );
    assert_eq!(store.count_jobs(request_id).unwrap(), 2);
}

#[tokio::test]
async fn test_stop_flag_halts_between_pages() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        2,
        ResponseTemplate::new(200)
            .set_body_json(search_page(4, 2, 40, &["b"]))
            .set_delay(Duration::from_millis(300)),
    )
    .await;
    for page in 3..=4 {
        mount_page(
            &server,
            page,
            ResponseTemplate::new(200).set_body_json(search_page(4, page, 40, &[])),
        )
        .await;
    }
    mount_first_page(
        &server,
        ResponseTemplate::new(200).set_body_json(search_page(4, 1, 40, &["a"])),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crawl.db");
    let mut config = create_test_config(&server, &db_path, false);
    config.crawler.page_workers = 1;

    let store = Arc::new(SqliteStore::new(&db_path).unwrap());
    let coordinator = Coordinator::new(config, store.clone()).unwrap();
    let stop = coordinator.stop_handle();

    // Raise the flag while the page 2 response is still in flight
    let watcher = async {
        loop {
            let requests = server.received_requests().await.unwrap_or_default();
            let page_two_seen = requests
                .iter()
                .any(|request| request.url.query_pairs().any(|(k, v)| k == "page" && v == "2"));
            if page_two_seen {
                stop.store(true, Ordering::Relaxed);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    let filter = python_filter();
    let (request_id, ()) = tokio::join!(coordinator.start(&filter), watcher);
    let request_id = request_id.unwrap();

    assert_eq!(
        store.get_request(request_id).unwrap().state,
        CrawlState::Paging
    );
    let statuses: Vec<(u32, Option<u16>)> = store
        .page_requests(request_id)
        .unwrap()
        .iter()
        .map(|page| (page.page, page.status))
        .collect();
    assert_eq!(statuses, vec![(2, Some(200)), (3, None), (4, None)]);
    assert_eq!(store.count_jobs(request_id).unwrap(), 2);

    // Clearing the flag lets resume pick up the remaining pages
    stop.store(false, Ordering::Relaxed);
    mount_details(&server).await;
    assert_eq!(
        coordinator.resume(request_id).await.unwrap(),
        CrawlState::Done
    );
    assert!(store.pending_page_requests(request_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_first_page_failure_marks_request_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/search"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crawl.db");
    let mut config = create_test_config(&server, &db_path, true);
    config.fetcher.max_attempts = 2;

    let store = Arc::new(SqliteStore::new(&db_path).unwrap());
    let coordinator = Coordinator::new(config, store.clone()).unwrap();
    let request_id = coordinator.start(&python_filter()).await.unwrap();

    let request = store.get_request(request_id).unwrap();
    assert_eq!(request.state, CrawlState::Failed);
    assert_eq!(request.status, Some(503));
    assert_eq!(request.num_pages, None);
    assert!(store.page_requests(request_id).unwrap().is_empty());

    // Failed is terminal
    assert_eq!(
        coordinator.resume(request_id).await.unwrap(),
        CrawlState::Failed
    );
}

#[tokio::test]
async fn test_payload_without_pagination_marks_request_failed() {
    let server = MockServer::start().await;
    mount_first_page(
        &server,
        ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crawl.db");
    let config = create_test_config(&server, &db_path, true);

    let store = Arc::new(SqliteStore::new(&db_path).unwrap());
    let coordinator = Coordinator::new(config, store.clone()).unwrap();
    let request_id = coordinator.start(&python_filter()).await.unwrap();

    let request = store.get_request(request_id).unwrap();
    assert_eq!(request.state, CrawlState::Failed);
    assert_eq!(request.status, Some(200));
    assert_eq!(store.count_jobs(request_id).unwrap(), 0);
}

#[tokio::test]
async fn test_backfill_merges_details_and_records_rejections() {
    let server = MockServer::start().await;
    mount_first_page(
        &server,
        ResponseTemplate::new(200).set_body_json(search_page(1, 1, 2, &["a", "b"])),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/api/job/b"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/job/a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "template_text": "Build things in Rust",
            "external_url": "https://careers.example.com/a",
            "contact_person": {"name": "Anna"},
            "is_active": false
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crawl.db");
    let mut config = create_test_config(&server, &db_path, false);
    config.output.archive_dir = Some(dir.path().join("archive").display().to_string());

    let store = Arc::new(SqliteStore::new(&db_path).unwrap());
    let coordinator = Coordinator::new(config, store.clone()).unwrap();
    let request_id = coordinator.start(&python_filter()).await.unwrap();
    assert_eq!(
        store.get_request(request_id).unwrap().state,
        CrawlState::PagesDone
    );

    let summary = coordinator
        .backfill(request_id, BackfillScope::Pending, None)
        .await
        .unwrap();
    assert_eq!(summary.selected, 2);
    assert_eq!(summary.backfilled, 1);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.pending, 0);

    let job = store.get_job("a").unwrap().unwrap();
    assert_eq!(job.status, Some(200));
    assert_eq!(job.detail.description.as_deref(), Some("Build things in Rust"));
    assert_eq!(
        job.detail.external_url.as_deref(),
        Some("https://careers.example.com/a")
    );
    assert_eq!(job.stub.is_active, Some(false));
    assert_eq!(job.stub.title.as_deref(), Some("Job a"));

    let rejected = store.get_job("b").unwrap().unwrap();
    assert_eq!(rejected.status, Some(404));
    assert_eq!(rejected.detail.description, None);

    assert_eq!(
        store.get_request(request_id).unwrap().state,
        CrawlState::Done
    );

    // Nothing left for the default scope; the 404 is picked up by non-success
    let again = coordinator
        .backfill(request_id, BackfillScope::Pending, None)
        .await
        .unwrap();
    assert_eq!(again.selected, 0);

    let jobs = store
        .jobs_for_backfill(Some(request_id), BackfillScope::NonSuccess, None)
        .unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].stub.job_key, "b");

    let archive = dir.path().join("archive");
    assert!(archive.join(format!("requests/{}.json", request_id)).exists());
    assert!(archive.join("jobs/a.json").exists());
}

#[tokio::test]
async fn test_second_request_counts_known_jobs_as_duplicates() {
    let server = MockServer::start().await;
    mount_first_page(
        &server,
        ResponseTemplate::new(200).set_body_json(search_page(1, 1, 3, &["a", "b", "c"])),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crawl.db");
    let config = create_test_config(&server, &db_path, false);

    let store = Arc::new(SqliteStore::new(&db_path).unwrap());
    let coordinator = Coordinator::new(config, store.clone()).unwrap();

    let first = coordinator.start(&python_filter()).await.unwrap();
    let second = coordinator.start(&python_filter()).await.unwrap();

    assert_eq!(store.count_jobs(first).unwrap(), 3);
    assert_eq!(store.count_jobs(second).unwrap(), 0);
    assert_eq!(store.get_request(second).unwrap().duplicates, 3);
}

#[tokio::test]
async fn test_backfill_all_spans_requests() {
    let server = MockServer::start().await;
    mount_first_page(
        &server,
        ResponseTemplate::new(200).set_body_json(search_page(1, 1, 2, &["a", "b"])),
    )
    .await;
    mount_details(&server).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("crawl.db");
    let config = create_test_config(&server, &db_path, false);

    let store = Arc::new(SqliteStore::new(&db_path).unwrap());
    let coordinator = Coordinator::new(config, store.clone()).unwrap();
    let request_id = coordinator.start(&python_filter()).await.unwrap();

    let summary = coordinator
        .backfill_all(BackfillScope::Pending, Some(1))
        .await
        .unwrap();
    assert_eq!(summary.selected, 1);
    assert_eq!(store.count_backfilled_jobs(request_id).unwrap(), 1);

    // Request state is untouched by a global pass
    assert_eq!(
        store.get_request(request_id).unwrap().state,
        CrawlState::PagesDone
    );
}

#[tokio::test]
async fn test_fetch_all_keeps_order_with_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(&FetcherConfig {
        max_attempts: 1,
        retry_backoff_ms: 0,
        ..Default::default()
    })
    .unwrap();

    let urls: Vec<String> = ["/down", "/ok", "/down", "/ok"]
        .iter()
        .map(|p| format!("{}{}", server.uri(), p))
        .collect();
    let results = fetcher.fetch_all(&urls).await;

    assert_eq!(results.len(), 4);
    assert!(results[0].is_soft_failure());
    assert!(matches!(results[1], FetchResult::Fetched(_)));
    assert!(results[2].is_soft_failure());
    assert!(matches!(results[3], FetchResult::Fetched(_)));
}
