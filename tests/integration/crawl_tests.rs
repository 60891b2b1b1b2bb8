//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the reference site and run the
//! full pipeline end-to-end against SQLite.

use oid_walker::config::{Config, CrawlerConfig, FetchConfig, OutputConfig};
use oid_walker::crawler::{FetchError, Fetcher, Pipeline};
use oid_walker::state::OidRecord;
use oid_walker::storage::{
    PendingEntry, SharedStorage, SqliteStorage, Storage, StorageError, StorageResult,
};
use oid_walker::WalkerError;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, db_path: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            walkers: 3,
            register_workers: 2,
            finalize_workers: 2,
            channel_capacity: 4,
            idle_backoff_ms: 10,
            idle_rounds: 5,
        },
        fetch: FetchConfig {
            base_url: base_url.to_string(),
            root: "/".to_string(),
            max_attempts: 2,
            retry_delay_ms: 0,
            cooldown_secs: 0,
            timeout_secs: 5,
            user_agents: vec!["TestAgent/1.0".to_string()],
        },
        output: OutputConfig {
            database_path: db_path.to_string(),
        },
    }
}

/// Renders a reference page listing the given children as
/// (identifier, name, sub children) rows
fn listing(children: &[(&str, &str, u32)]) -> String {
    let rows: String = children
        .iter()
        .map(|(oid, name, sub)| {
            format!(
                r#"<tr><td><a href="{oid}">{oid}</a></td><td>{name}</td><td>{sub}</td><td>0</td><td>{name} node</td><td>About {name}</td></tr>"#
            )
        })
        .collect();

    format!(
        r#"<html><body>
        <h2>Children</h2>
        <table>
            <tr><th>OID</th><th>Name</th><th>Sub children</th><th>Sub Nodes Total</th><th>Description</th><th>Information</th></tr>
            {rows}
        </table>
        <h3>Brothers (0)</h3>
        </body></html>"#
    )
}

async fn mount_page(server: &MockServer, oid: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(oid))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn open_shared(db_path: &Path) -> SharedStorage {
    SharedStorage::new(SqliteStorage::new(db_path).unwrap())
}

#[tokio::test]
async fn test_full_crawl_reaches_quiescence() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("mibs.sqlite");

    mount_page(
        &mock_server,
        "/",
        listing(&[("/0", "itu-t", 1), ("/1", "iso", 0), ("/2", "joint-iso-itu-t", 0)]),
    )
    .await;
    mount_page(&mock_server, "/0", listing(&[("/0.5", "r-recommendation", 0)])).await;
    mount_page(&mock_server, "/1", listing(&[])).await;
    mount_page(&mock_server, "/2", listing(&[])).await;
    mount_page(&mock_server, "/0.5", listing(&[])).await;

    let config = create_test_config(&mock_server.uri(), db_path.to_str().unwrap());
    let storage = open_shared(&db_path);

    let summary = Pipeline::new(&config, storage.clone())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(summary.completed);
    assert_eq!(summary.pages_fetched, 5);
    assert_eq!(summary.persisted, 4);
    // The root has no parent row, so no record
    assert_eq!(summary.unresolved, 1);

    let iso = storage.with(|s| s.get_record("/1")).unwrap().unwrap();
    assert_eq!(iso.name, "iso");
    assert_eq!(iso.description, "iso node");
    assert_eq!(iso.information, "About iso");

    let nested = storage.with(|s| s.get_record("/0.5")).unwrap().unwrap();
    assert_eq!(nested.name, "r-recommendation");

    assert_eq!(storage.with(|s| s.count_records()).unwrap(), 4);
    assert_eq!(storage.with(|s| s.count_pending()).unwrap(), 0);
}

#[tokio::test]
async fn test_fetch_gives_up_after_max_attempts() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/1.3"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let config = FetchConfig {
        base_url: mock_server.uri(),
        max_attempts: 3,
        retry_delay_ms: 0,
        cooldown_secs: 0,
        ..FetchConfig::default()
    };
    let fetcher = Fetcher::new(&config).unwrap();

    let result = fetcher.fetch("/1.3").await;
    match result {
        Err(FetchError::Exhausted { oid, attempts, .. }) => {
            assert_eq!(oid, "/1.3");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected Exhausted, got {:?}", other.map(|b| b.len())),
    }
}

#[tokio::test]
async fn test_fetch_recovers_after_transient_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/2"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "/2", listing(&[])).await;

    let config = FetchConfig {
        base_url: mock_server.uri(),
        max_attempts: 3,
        retry_delay_ms: 0,
        cooldown_secs: 0,
        ..FetchConfig::default()
    };
    let fetcher = Fetcher::new(&config).unwrap();

    let body = fetcher.fetch("/2").await.unwrap();
    assert!(String::from_utf8(body).unwrap().contains("Brothers"));
}

#[tokio::test]
async fn test_resume_from_pending_frontier() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("mibs.sqlite");

    // An earlier run stopped while /1.3 was being processed
    {
        let mut storage = SqliteStorage::new(&db_path).unwrap();
        let org = OidRecord {
            name: "identified-organization".to_string(),
            sub_children: 1,
            ..OidRecord::default()
        };
        storage.enqueue_discovered("/1.3", &org).unwrap();
        storage.take_most_recent_pending().unwrap();
    }

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[])))
        .expect(0)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "/1.3", listing(&[("/1.3.6", "dod", 1)])).await;
    mount_page(&mock_server, "/1.3.6", listing(&[])).await;

    let config = create_test_config(&mock_server.uri(), db_path.to_str().unwrap());
    let storage = open_shared(&db_path);

    let summary = Pipeline::new(&config, storage.clone())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(summary.completed);
    assert_eq!(summary.pages_fetched, 2);
    assert_eq!(summary.persisted, 2);

    let org = storage.with(|s| s.get_record("/1.3")).unwrap().unwrap();
    assert_eq!(org.name, "identified-organization");

    let dod = storage.with(|s| s.get_record("/1.3.6")).unwrap().unwrap();
    assert_eq!(dod.name, "dod");
    assert_eq!(dod.sub_children, 1);
    assert_eq!(storage.with(|s| s.count_pending()).unwrap(), 0);
}

#[tokio::test]
async fn test_persisted_identifiers_are_not_fetched_again() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("mibs.sqlite");

    {
        let mut storage = SqliteStorage::new(&db_path).unwrap();
        let record = OidRecord {
            name: "itu-t".to_string(),
            ..OidRecord::default()
        };
        storage.insert_record("/0", &record).unwrap();
    }

    mount_page(&mock_server, "/", listing(&[("/0", "itu-t", 7), ("/1", "iso", 4)])).await;
    Mock::given(method("GET"))
        .and(path("/0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[])))
        .expect(0)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "/1", listing(&[])).await;

    let config = create_test_config(&mock_server.uri(), db_path.to_str().unwrap());
    let storage = open_shared(&db_path);

    let summary = Pipeline::new(&config, storage.clone())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(summary.completed);
    assert_eq!(summary.persisted, 1);
    assert_eq!(storage.with(|s| s.count_records()).unwrap(), 2);
}

#[tokio::test]
async fn test_shared_child_is_dispatched_once() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("mibs.sqlite");

    mount_page(&mock_server, "/", listing(&[("/1", "iso", 1), ("/2", "joint", 1)])).await;
    mount_page(&mock_server, "/1", listing(&[("/1.3", "org", 0)])).await;
    mount_page(&mock_server, "/2", listing(&[("/1.3", "org", 0)])).await;
    Mock::given(method("GET"))
        .and(path("/1.3"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), db_path.to_str().unwrap());
    let storage = open_shared(&db_path);

    let summary = Pipeline::new(&config, storage.clone())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(summary.completed);
    assert_eq!(summary.pages_fetched, 4);
    assert_eq!(storage.with(|s| s.count_records()).unwrap(), 3);
}

#[tokio::test]
async fn test_records_survive_restart_before_children_finish() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("mibs.sqlite");

    // First run: children of the root cannot be fetched, then it is stopped
    {
        let mock_server = MockServer::start().await;
        mount_page(&mock_server, "/", listing(&[("/0", "itu-t", 7), ("/1", "iso", 4)])).await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_delay(Duration::from_millis(20)))
            .mount(&mock_server)
            .await;

        let mut config = create_test_config(&mock_server.uri(), db_path.to_str().unwrap());
        config.fetch.max_attempts = 1;
        config.crawler.idle_rounds = 0;

        let pipeline = Pipeline::new(&config, open_shared(&db_path)).unwrap();
        let shutdown = pipeline.shutdown_handle();
        let handle = tokio::spawn(pipeline.run());

        tokio::time::sleep(Duration::from_millis(300)).await;
        shutdown.cancel();
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.persisted, 0);
    }

    // Second run: the site is healthy again
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "/0", listing(&[])).await;
    mount_page(&mock_server, "/1", listing(&[])).await;

    let config = create_test_config(&mock_server.uri(), db_path.to_str().unwrap());
    let storage = open_shared(&db_path);
    let summary = Pipeline::new(&config, storage.clone())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(summary.completed);
    assert_eq!(summary.persisted, 2);

    let itu = storage.with(|s| s.get_record("/0")).unwrap().unwrap();
    assert_eq!(itu.name, "itu-t");
    assert_eq!(itu.sub_children, 7);
    let iso = storage.with(|s| s.get_record("/1")).unwrap().unwrap();
    assert_eq!(iso.name, "iso");
    assert_eq!(storage.with(|s| s.count_pending()).unwrap(), 0);
}

#[tokio::test]
async fn test_dead_link_does_not_block_completion() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("mibs.sqlite");

    mount_page(&mock_server, "/", listing(&[("/1", "iso", 0), ("/2", "joint", 0)])).await;
    Mock::given(method("GET"))
        .and(path("/1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "/2", listing(&[])).await;

    let config = create_test_config(&mock_server.uri(), db_path.to_str().unwrap());
    let storage = open_shared(&db_path);

    let summary = tokio::time::timeout(
        Duration::from_secs(10),
        Pipeline::new(&config, storage.clone()).unwrap().run(),
    )
    .await
    .expect("crawl did not finish")
    .unwrap();

    assert!(summary.completed);
    assert_eq!(summary.dead_links, 1);
    assert_eq!(summary.requeued, 0);
    assert_eq!(summary.persisted, 1);

    assert!(storage.with(|s| s.get_record("/1")).unwrap().is_none());
    assert!(storage.with(|s| s.get_record("/2")).unwrap().is_some());
    assert_eq!(storage.with(|s| s.count_pending()).unwrap(), 0);
}

#[tokio::test]
async fn test_undecodable_page_is_skipped() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("mibs.sqlite");

    mount_page(&mock_server, "/", listing(&[("/1", "iso", 4), ("/2", "joint", 0)])).await;
    Mock::given(method("GET"))
        .and(path("/1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xfe]))
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "/2", listing(&[])).await;

    let config = create_test_config(&mock_server.uri(), db_path.to_str().unwrap());
    let storage = open_shared(&db_path);

    let summary = Pipeline::new(&config, storage.clone())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(summary.completed);
    assert_eq!(summary.parse_anomalies, 1);
    assert_eq!(summary.pages_fetched, 3);
    // The record comes from the root listing, not from the broken page
    assert_eq!(storage.with(|s| s.get_record("/1")).unwrap().unwrap().name, "iso");
    assert_eq!(storage.with(|s| s.count_records()).unwrap(), 2);
}

#[tokio::test]
async fn test_interrupt_keeps_unfinished_work_pending() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("mibs.sqlite");

    mount_page(&mock_server, "/", listing(&[("/1", "iso", 4)])).await;
    Mock::given(method("GET"))
        .and(path("/1"))
        .respond_with(ResponseTemplate::new(503).set_delay(Duration::from_millis(20)))
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&mock_server.uri(), db_path.to_str().unwrap());
    config.fetch.max_attempts = 1;
    config.crawler.idle_rounds = 0;
    let storage = open_shared(&db_path);

    let pipeline = Pipeline::new(&config, storage.clone()).unwrap();
    let shutdown = pipeline.shutdown_handle();
    let handle = tokio::spawn(pipeline.run());

    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown.cancel();

    let summary = handle.await.unwrap().unwrap();
    assert!(!summary.completed);
    assert!(summary.requeued >= 1);
    assert_eq!(summary.persisted, 0);

    assert!(storage.with(|s| s.get_record("/1")).unwrap().is_none());
    let next = storage
        .with(|s| {
            s.recover_leased()?;
            s.peek_most_recent_pending()
        })
        .unwrap();
    assert_eq!(next.as_deref(), Some("/1"));
}

/// Storage that refuses to enqueue discovered children
struct FailingStorage {
    inner: SqliteStorage,
}

impl Storage for FailingStorage {
    fn initialize_schema(&mut self) -> StorageResult<()> {
        self.inner.initialize_schema()
    }

    fn insert_record(&mut self, oid: &str, record: &OidRecord) -> StorageResult<bool> {
        self.inner.insert_record(oid, record)
    }

    fn get_record(&self, oid: &str) -> StorageResult<Option<OidRecord>> {
        self.inner.get_record(oid)
    }

    fn count_records(&self) -> StorageResult<u64> {
        self.inner.count_records()
    }

    fn load_persisted_ids(&self) -> StorageResult<HashSet<String>> {
        self.inner.load_persisted_ids()
    }

    fn enqueue_pending(&mut self, oid: &str) -> StorageResult<()> {
        self.inner.enqueue_pending(oid)
    }

    fn enqueue_discovered(&mut self, _oid: &str, _record: &OidRecord) -> StorageResult<()> {
        Err(StorageError::Database("disk full".to_string()))
    }

    fn take_most_recent_pending(&mut self) -> StorageResult<PendingEntry> {
        self.inner.take_most_recent_pending()
    }

    fn peek_most_recent_pending(&self) -> StorageResult<Option<String>> {
        self.inner.peek_most_recent_pending()
    }

    fn remove_pending(&mut self, oid: &str) -> StorageResult<()> {
        self.inner.remove_pending(oid)
    }

    fn release_pending(&mut self, oid: &str) -> StorageResult<()> {
        self.inner.release_pending(oid)
    }

    fn recover_leased(&mut self) -> StorageResult<u64> {
        self.inner.recover_leased()
    }

    fn count_pending(&self) -> StorageResult<u64> {
        self.inner.count_pending()
    }

    fn clear_pending(&mut self) -> StorageResult<()> {
        self.inner.clear_pending()
    }
}

#[tokio::test]
async fn test_storage_failure_stops_pipeline() {
    let mock_server = MockServer::start().await;

    mount_page(&mock_server, "/", listing(&[("/0", "itu-t", 0), ("/1", "iso", 0)])).await;

    let mut config = create_test_config(&mock_server.uri(), "unused.sqlite");
    // Without the failure the crawl would never end on its own
    config.crawler.idle_rounds = 0;

    let storage = SharedStorage::new(FailingStorage {
        inner: SqliteStorage::new_in_memory().unwrap(),
    });

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        Pipeline::new(&config, storage.clone()).unwrap().run(),
    )
    .await
    .expect("pipeline did not shut down");

    match result {
        Err(WalkerError::Storage(StorageError::Database(message))) => {
            assert_eq!(message, "disk full");
        }
        other => panic!("expected storage error, got {:?}", other),
    }

    // The root was never finalized, so it is still pending
    assert_eq!(storage.with(|s| s.count_pending()).unwrap(), 1);
    assert_eq!(storage.with(|s| s.count_records()).unwrap(), 0);
}
