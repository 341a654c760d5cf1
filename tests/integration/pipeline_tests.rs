//! Integration tests for the ingestion pipeline
//!
//! Most tests drive the coordinator with an in-memory site and an in-memory
//! warehouse so every fetch and row can be inspected. The last test runs the
//! real HTTP fetcher against a wiremock server and writes to SQLite.

use async_trait::async_trait;
use crawl_ingest::config::{Config, FetcherConfig, WarehouseBackend, WarehouseConfig};
use crawl_ingest::crawler::{Coordinator, FetchError, FetchedPage, HttpFetcher, PageFetcher};
use crawl_ingest::record::{Cookie, FetchResult};
use crawl_ingest::sink::{
    Sink, SqliteWarehouse, TableRef, TableSchema, TimePartitioning, Warehouse, WarehouseError,
    WarehouseResult,
};
use crawl_ingest::{IngestError, PipelineState};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ===== Test doubles =====

#[derive(Clone, Default)]
struct SitePage {
    final_url: Option<String>,
    links: Vec<String>,
    cookies: Vec<Cookie>,
    local_storage: BTreeMap<String, String>,
    delay: Option<Duration>,
}

impl SitePage {
    fn linking(links: &[&str]) -> Self {
        Self {
            links: links.iter().map(|l| l.to_string()).collect(),
            ..Default::default()
        }
    }

    fn with_state(mut self) -> Self {
        self.cookies.push(Cookie {
            name: "sid".to_string(),
            value: "abc".to_string(),
            domain: ".example.com".to_string(),
            path: "/".to_string(),
            expires: 1591696664.0,
            size: 6,
            http_only: true,
            secure: true,
            session: false,
            same_site: None,
        });
        self.local_storage
            .insert("theme".to_string(), "dark".to_string());
        self
    }
}

/// In-memory site; records every URL it is asked for
#[derive(Default)]
struct SiteFetcher {
    pages: HashMap<String, SitePage>,
    fetched: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SiteFetcher {
    fn new(pages: Vec<(&str, SitePage)>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|(url, page)| (url.to_string(), page))
                .collect(),
            ..Default::default()
        }
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for SiteFetcher {
    async fn fetch(&self, url: &Url, referrer: Option<&str>) -> Result<FetchedPage, FetchError> {
        self.fetched.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let page = self.pages.get(url.as_str()).cloned();
        if let Some(delay) = page.as_ref().and_then(|p| p.delay) {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let page = page.ok_or_else(|| FetchError::Other {
            url: url.to_string(),
            message: "not found".to_string(),
        })?;

        let final_url = page.final_url.clone().unwrap_or_else(|| url.to_string());
        let mut result = FetchResult::new(url.as_str(), final_url);
        result.content_type = Some("text/html".to_string());
        result.cookies = page.cookies;
        result.local_storage = page.local_storage;
        result.page_title = Some(format!("Title of {}", url));
        result.previous_url = referrer.map(str::to_string);

        Ok(FetchedPage {
            result,
            links: page.links,
        })
    }
}

/// Warehouse that keeps rows in memory and can be told to fail
#[derive(Default)]
struct RecordingWarehouse {
    pre_existing: bool,
    fail_provisioning: bool,
    fail_write_for: Option<String>,
    dataset_calls: AtomicUsize,
    table_calls: AtomicUsize,
    rows: Mutex<Vec<Value>>,
}

impl RecordingWarehouse {
    fn rows(&self) -> Vec<Value> {
        self.rows.lock().unwrap().clone()
    }

    fn row_for(&self, url: &str) -> Option<Value> {
        self.rows()
            .into_iter()
            .find(|row| row["requested_url"] == url)
    }
}

#[async_trait]
impl Warehouse for RecordingWarehouse {
    async fn create_dataset(&self, dataset_id: &str) -> WarehouseResult<()> {
        self.dataset_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_provisioning {
            return Err(WarehouseError::Api {
                status: 500,
                reason: "backendError".to_string(),
                message: "Backend error".to_string(),
            });
        }
        if self.pre_existing {
            return Err(WarehouseError::AlreadyExists(dataset_id.to_string()));
        }
        Ok(())
    }

    async fn create_table(
        &self,
        table: &TableRef,
        _schema: &TableSchema,
        _partitioning: TimePartitioning,
    ) -> WarehouseResult<()> {
        self.table_calls.fetch_add(1, Ordering::SeqCst);
        if self.pre_existing {
            return Err(WarehouseError::AlreadyExists(table.to_string()));
        }
        Ok(())
    }

    async fn insert_rows(&self, _table: &TableRef, rows: Vec<Value>) -> WarehouseResult<()> {
        for row in &rows {
            if let Some(fail) = &self.fail_write_for {
                if row["requested_url"] == fail.as_str() {
                    return Err(WarehouseError::InsertRejected(format!("{} rejected", fail)));
                }
            }
        }
        self.rows.lock().unwrap().extend(rows);
        Ok(())
    }
}

// ===== Helpers =====

fn test_config(start_url: &str, domain: &str) -> Config {
    Config {
        start_url: start_url.to_string(),
        domain: domain.to_string(),
        base_path: None,
        skip_external: false,
        cookies_only: false,
        fetcher: FetcherConfig::default(),
        warehouse: WarehouseConfig {
            backend: WarehouseBackend::Sqlite,
            dataset_id: "crawl".to_string(),
            table_id: "pages".to_string(),
            project_id: None,
            endpoint: None,
            access_token_env: "UNUSED".to_string(),
            database_path: None,
        },
    }
}

fn example_config() -> Config {
    test_config("https://example.com/", "example.com")
}

fn build(
    config: Config,
    fetcher: &Arc<SiteFetcher>,
    warehouse: &Arc<RecordingWarehouse>,
) -> Coordinator {
    Coordinator::new(config, fetcher.clone(), warehouse.clone()).unwrap()
}

// ===== Scenarios =====

#[tokio::test]
async fn test_external_link_fetched_but_not_expanded() {
    let fetcher = Arc::new(SiteFetcher::new(vec![
        (
            "https://example.com/",
            SitePage::linking(&["https://other.com/"]).with_state(),
        ),
        (
            "https://other.com/",
            SitePage::linking(&["https://other.com/deeper"]).with_state(),
        ),
        ("https://other.com/deeper", SitePage::default()),
    ]));
    let warehouse = Arc::new(RecordingWarehouse::default());
    let mut coordinator = build(example_config(), &fetcher, &warehouse);

    let summary = coordinator.run().await.unwrap();

    assert_eq!(
        fetcher.fetched(),
        vec!["https://example.com/".to_string(), "https://other.com/".to_string()]
    );
    assert_eq!(summary.pages_crawled, 2);
    assert_eq!(warehouse.rows().len(), 2);

    let seed = warehouse.row_for("https://example.com/").unwrap();
    assert_eq!(seed["external"], false);
    assert_eq!(seed["cookies"].as_array().unwrap().len(), 1);
    assert_eq!(seed["cookies"][0]["expires"], "2020-06-09T09:57:44.000Z");
    assert_eq!(seed["cookies"][0]["sameSite"], "Unspecified");
    assert_eq!(seed["local_storage"][0]["name"], "theme");

    let external = warehouse.row_for("https://other.com/").unwrap();
    assert_eq!(external["external"], true);
    assert_eq!(external["cookies"], serde_json::json!([]));
    assert_eq!(external["local_storage"], serde_json::json!([]));
    assert_eq!(external["previous_url"], "https://example.com/");
}

#[tokio::test]
async fn test_provisioning_failure_fetches_nothing() {
    let fetcher = Arc::new(SiteFetcher::new(vec![(
        "https://example.com/",
        SitePage::default(),
    )]));
    let warehouse = Arc::new(RecordingWarehouse {
        fail_provisioning: true,
        ..Default::default()
    });
    let mut coordinator = build(example_config(), &fetcher, &warehouse);

    let err = coordinator.run().await.unwrap_err();

    assert!(matches!(err, IngestError::Provisioning(_)), "{}", err);
    assert_eq!(coordinator.state(), PipelineState::Failed);
    assert!(fetcher.fetched().is_empty());
    assert!(warehouse.rows().is_empty());
    assert_eq!(warehouse.table_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_single_write_failure_does_not_stop_crawl() {
    let fetcher = Arc::new(SiteFetcher::new(vec![
        (
            "https://example.com/",
            SitePage::linking(&[
                "https://example.com/2",
                "https://example.com/3",
                "https://example.com/4",
                "https://example.com/5",
            ]),
        ),
        ("https://example.com/2", SitePage::default()),
        ("https://example.com/3", SitePage::default()),
        ("https://example.com/4", SitePage::default()),
        ("https://example.com/5", SitePage::default()),
    ]));
    let warehouse = Arc::new(RecordingWarehouse {
        fail_write_for: Some("https://example.com/2".to_string()),
        ..Default::default()
    });
    let mut coordinator = build(example_config(), &fetcher, &warehouse);

    let summary = coordinator.run().await.unwrap();

    assert_eq!(fetcher.fetched().len(), 5);
    assert_eq!(summary.pages_fetched, 5);
    assert_eq!(summary.pages_crawled, 4);
    assert_eq!(summary.write_failures, 1);
    assert!(warehouse.row_for("https://example.com/2").is_none());
    for page in ["3", "4", "5"] {
        assert!(warehouse
            .row_for(&format!("https://example.com/{}", page))
            .is_some());
    }
    assert_eq!(coordinator.state(), PipelineState::Done);
}

#[tokio::test]
async fn test_ensure_schema_against_existing_resources() {
    let warehouse = Arc::new(RecordingWarehouse {
        pre_existing: true,
        ..Default::default()
    });
    let sink = Sink::new(warehouse.clone(), TableRef::new("crawl", "pages"));

    sink.ensure_schema().await.unwrap();
    sink.ensure_schema().await.unwrap();

    assert_eq!(warehouse.dataset_calls.load(Ordering::SeqCst), 2);
    assert_eq!(warehouse.table_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_existing_resources_do_not_block_the_crawl() {
    let fetcher = Arc::new(SiteFetcher::new(vec![(
        "https://example.com/",
        SitePage::default(),
    )]));
    let warehouse = Arc::new(RecordingWarehouse {
        pre_existing: true,
        ..Default::default()
    });
    let mut coordinator = build(example_config(), &fetcher, &warehouse);

    let summary = coordinator.run().await.unwrap();
    assert_eq!(summary.pages_crawled, 1);
}

#[tokio::test]
async fn test_skip_external() {
    let fetcher = Arc::new(SiteFetcher::new(vec![
        (
            "https://example.com/",
            SitePage::linking(&[
                "https://other.com/",
                "https://example.com.evil.com/",
                "https://www.example.com/about",
            ]),
        ),
        ("https://www.example.com/about", SitePage::default()),
    ]));
    let warehouse = Arc::new(RecordingWarehouse::default());
    let mut config = example_config();
    config.skip_external = true;
    let mut coordinator = build(config, &fetcher, &warehouse);

    let summary = coordinator.run().await.unwrap();

    assert_eq!(
        fetcher.fetched(),
        vec![
            "https://example.com/".to_string(),
            "https://www.example.com/about".to_string()
        ]
    );
    assert_eq!(summary.urls_skipped, 2);
    assert_eq!(summary.pages_crawled, 2);
    assert_eq!(
        warehouse.row_for("https://www.example.com/about").unwrap()["external"],
        false
    );
}

#[tokio::test]
async fn test_out_of_scope_seed_is_still_fetched() {
    let fetcher = Arc::new(SiteFetcher::new(vec![(
        "https://other.com/",
        SitePage::linking(&["https://other.com/next"]),
    )]));
    let warehouse = Arc::new(RecordingWarehouse::default());
    let mut config = test_config("https://other.com/", "example.com");
    config.skip_external = true;
    let mut coordinator = build(config, &fetcher, &warehouse);

    let summary = coordinator.run().await.unwrap();

    assert_eq!(fetcher.fetched(), vec!["https://other.com/".to_string()]);
    assert_eq!(summary.pages_crawled, 1);
    assert_eq!(warehouse.rows()[0]["external"], true);
}

#[tokio::test]
async fn test_seed_depth_is_unbounded() {
    let depth = 60;
    let mut pages = Vec::new();
    let urls: Vec<String> = (0..=depth)
        .map(|i| format!("https://example.com/p{}", i))
        .collect();
    for i in 0..depth {
        pages.push((urls[i].as_str(), SitePage::linking(&[urls[i + 1].as_str()])));
    }
    pages.push((urls[depth].as_str(), SitePage::default()));

    let fetcher = Arc::new(SiteFetcher::new(pages));
    let warehouse = Arc::new(RecordingWarehouse::default());
    let config = test_config(&urls[0], "example.com");
    let mut coordinator = build(config, &fetcher, &warehouse);

    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.pages_crawled, depth as u64 + 1);
}

#[tokio::test]
async fn test_redirect_target_not_fetched_again() {
    let fetcher = Arc::new(SiteFetcher::new(vec![
        (
            "https://example.com/",
            SitePage::linking(&["https://example.com/old"]),
        ),
        (
            "https://example.com/old",
            SitePage {
                final_url: Some("https://example.com/new".to_string()),
                links: vec!["https://example.com/new".to_string()],
                ..Default::default()
            },
        ),
        ("https://example.com/new", SitePage::default()),
    ]));
    let warehouse = Arc::new(RecordingWarehouse::default());
    let mut coordinator = build(example_config(), &fetcher, &warehouse);

    let summary = coordinator.run().await.unwrap();

    assert_eq!(
        fetcher.fetched(),
        vec![
            "https://example.com/".to_string(),
            "https://example.com/old".to_string()
        ]
    );
    assert_eq!(summary.pages_crawled, 2);

    let redirected = warehouse.row_for("https://example.com/old").unwrap();
    assert_eq!(redirected["final_url"], "https://example.com/new");
}

#[tokio::test]
async fn test_redirect_out_of_scope_is_redacted() {
    let fetcher = Arc::new(SiteFetcher::new(vec![(
        "https://example.com/",
        SitePage {
            final_url: Some("https://other.com/landing".to_string()),
            ..Default::default()
        }
        .with_state(),
    )]));
    let warehouse = Arc::new(RecordingWarehouse::default());
    let mut coordinator = build(example_config(), &fetcher, &warehouse);

    coordinator.run().await.unwrap();

    let row = warehouse.row_for("https://example.com/").unwrap();
    assert_eq!(row["external"], true);
    assert_eq!(row["cookies"], serde_json::json!([]));
}

#[tokio::test]
async fn test_redirect_out_of_scope_is_not_expanded() {
    let fetcher = Arc::new(SiteFetcher::new(vec![
        (
            "https://example.com/",
            SitePage::linking(&["https://example.com/go"]),
        ),
        (
            "https://example.com/go",
            SitePage {
                final_url: Some("https://other.com/landing".to_string()),
                links: vec![
                    "https://other.com/deeper".to_string(),
                    "https://example.com/from-elsewhere".to_string(),
                ],
                ..Default::default()
            },
        ),
        ("https://other.com/deeper", SitePage::default()),
        ("https://example.com/from-elsewhere", SitePage::default()),
    ]));
    let warehouse = Arc::new(RecordingWarehouse::default());
    let mut coordinator = build(example_config(), &fetcher, &warehouse);

    let summary = coordinator.run().await.unwrap();

    assert_eq!(
        fetcher.fetched(),
        vec![
            "https://example.com/".to_string(),
            "https://example.com/go".to_string()
        ]
    );
    assert_eq!(summary.pages_crawled, 2);
    assert_eq!(
        warehouse.row_for("https://example.com/go").unwrap()["external"],
        true
    );
}

#[tokio::test]
async fn test_cookies_only_mode() {
    let fetcher = Arc::new(SiteFetcher::new(vec![(
        "https://example.com/",
        SitePage::default().with_state(),
    )]));
    let warehouse = Arc::new(RecordingWarehouse::default());
    let mut config = example_config();
    config.cookies_only = true;
    let mut coordinator = build(config, &fetcher, &warehouse);

    coordinator.run().await.unwrap();

    let row = warehouse.row_for("https://example.com/").unwrap();
    let object = row.as_object().unwrap();
    assert!(object.contains_key("cookies"));
    assert!(object.contains_key("local_storage"));
    assert!(!object.contains_key("final_url"));
    assert!(!object.contains_key("document_title"));
}

#[tokio::test]
async fn test_concurrency_limit_is_respected() {
    let children: Vec<String> = (0..12)
        .map(|i| format!("https://example.com/c{}", i))
        .collect();
    let child_refs: Vec<&str> = children.iter().map(String::as_str).collect();

    let mut pages = vec![("https://example.com/", SitePage::linking(&child_refs))];
    for child in &children {
        pages.push((
            child.as_str(),
            SitePage {
                delay: Some(Duration::from_millis(20)),
                ..Default::default()
            },
        ));
    }

    let fetcher = Arc::new(SiteFetcher::new(pages));
    let warehouse = Arc::new(RecordingWarehouse::default());
    let mut config = example_config();
    config.fetcher.max_concurrent_pages = 3;
    let mut coordinator = build(config, &fetcher, &warehouse);

    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.pages_crawled, 13);
    let max = fetcher.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 3, "{} fetches were in flight", max);
}

#[tokio::test]
async fn test_deadline_abandons_remaining_work() {
    let fetcher = Arc::new(SiteFetcher::new(vec![
        (
            "https://example.com/",
            SitePage::linking(&["https://example.com/slow"]),
        ),
        (
            "https://example.com/slow",
            SitePage {
                delay: Some(Duration::from_secs(30)),
                ..Default::default()
            },
        ),
    ]));
    let warehouse = Arc::new(RecordingWarehouse::default());
    let mut config = example_config();
    config.fetcher.crawl_timeout_secs = Some(1);
    let mut coordinator = build(config, &fetcher, &warehouse);

    let summary = tokio::time::timeout(Duration::from_secs(10), coordinator.run())
        .await
        .expect("run should stop at the deadline")
        .unwrap();

    assert!(summary.deadline_exceeded);
    assert_eq!(summary.pages_crawled, 1);
    assert!(warehouse.row_for("https://example.com/").is_some());
    assert_eq!(coordinator.state(), PipelineState::Done);
}

// ===== End to end over HTTP =====

#[tokio::test]
async fn test_http_crawl_into_sqlite() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "sid=abc123; Path=/; HttpOnly")
                .set_body_raw(
                    r#"<html><head><title>Home</title>
                    <meta name="description" content="The home page"></head>
                    <body>
                        <a href="/about">About</a>
                        <a href="https://external.invalid/">Elsewhere</a>
                    </body></html>"#,
                    "text/html",
                ),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html><head><title>About</title></head></html>", "text/html"),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("warehouse.db");

    let mut config = test_config(&format!("{}/", base), "127.0.0.1");
    config.skip_external = true;
    config.warehouse.database_path = Some(db_path.to_string_lossy().into_owned());

    let fetcher = Arc::new(HttpFetcher::from_config(&config.fetcher).unwrap());
    let warehouse = Arc::new(SqliteWarehouse::new(&db_path).unwrap());
    let mut coordinator = Coordinator::new(config, fetcher, warehouse).unwrap();

    let summary = coordinator.run().await.unwrap();
    assert_eq!(summary.pages_crawled, 2);
    assert_eq!(summary.urls_skipped, 1);

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let mut stmt = conn
        .prepare(
            "SELECT requested_url, document_title, meta_description, cookies, external, http_status
             FROM crawl__pages ORDER BY requested_url",
        )
        .unwrap();
    let rows: Vec<(String, Option<String>, Option<String>, String, i64, i64)> = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(rows.len(), 2);

    let (home_url, home_title, home_description, home_cookies, home_external, home_status) =
        &rows[0];
    assert_eq!(home_url, &format!("{}/", base));
    assert_eq!(home_title.as_deref(), Some("Home"));
    assert_eq!(home_description.as_deref(), Some("The home page"));
    assert_eq!(*home_external, 0);
    assert_eq!(*home_status, 200);

    let cookies: Value = serde_json::from_str(home_cookies).unwrap();
    assert_eq!(cookies[0]["name"], "sid");
    assert_eq!(cookies[0]["httpOnly"], true);
    assert_eq!(cookies[0]["session"], true);

    let (about_url, about_title, ..) = &rows[1];
    assert_eq!(about_url, &format!("{}/about", base));
    assert_eq!(about_title.as_deref(), Some("About"));
}
