use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Once};

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use docsync_core::{Document, ProviderEntry};
use docsync_engine::{
    content_hash, local_path_for, Clock, ConfigError, FetchError, FetchMetadata, FetchOutput,
    FetchSettings, Fetcher, ManifestStore, RateLimitSettings, StaticMarkupExtractor, SyncConfig,
    SyncError, SyncOrchestrator,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

/// Every call returns a timestamp one second later than the previous one.
fn stepping_clock() -> Clock {
    let tick = Arc::new(AtomicI64::new(0));
    Arc::new(move || {
        let offset = tick.fetch_add(1, Ordering::SeqCst);
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(offset)
    })
}

fn config(root: &Path) -> SyncConfig {
    SyncConfig {
        fetch: FetchSettings {
            require_https: false,
            ..FetchSettings::default()
        }
        .with_allowed_hosts(["127.0.0.1"]),
        rate_limit: RateLimitSettings {
            capacity: 10,
            per_second: 1000.0,
        },
        clock: stepping_clock(),
        ..SyncConfig::default_with_docs_root(root.join("docs"))
    }
}

fn orchestrator(root: &Path) -> SyncOrchestrator {
    let config = config(root);
    let store =
        ManifestStore::open_with_clock(root.join("manifest.json"), config.clock.clone()).unwrap();
    SyncOrchestrator::with_defaults(config, store).unwrap()
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<html><head><title>{title}</title>\
         <meta name=\"keywords\" content=\"acme, guides\"></head>\
         <body><nav>Menu</nav><main><h1>{title}</h1><p>{body}</p></main></body></html>"
    )
}

async fn serve(server: &MockServer, route: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html; charset=utf-8"))
        .mount(server)
        .await;
}

async fn serve_guides(server: &MockServer, second_body: &str) {
    serve(server, "/guide/one", page("One", "First page.")).await;
    serve(server, "/guide/two", page("Two", second_body)).await;
    serve(server, "/guide/three", page("Three", "Third page.")).await;
}

fn guide_entries(server: &MockServer) -> Vec<ProviderEntry> {
    ["one", "two", "three"]
        .iter()
        .map(|slug| ProviderEntry::new(format!("{}/guide/{slug}", server.uri()), "guides"))
        .collect()
}

fn by_url<'a>(docs: &'a [Document], url: &str) -> &'a Document {
    docs.iter().find(|d| d.url == url).unwrap()
}

#[tokio::test]
async fn second_run_only_rewrites_changed_pages() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let server = MockServer::start().await;
    serve_guides(&server, "Second page.").await;
    let entries = guide_entries(&server);

    let mut sync = orchestrator(temp.path());
    let first = sync.sync("acme", &entries).await.unwrap();
    assert_eq!((first.fetched, first.updated, first.unchanged, first.failed), (3, 0, 0, 0));
    assert!(first.is_success());
    assert_eq!(sync.store().list_providers(), vec!["acme"]);
    assert_eq!(sync.store().list_categories(), vec!["guides"]);

    let before = sync.store().documents().to_vec();
    for doc in &before {
        let text = fs::read_to_string(temp.path().join("docs").join(&doc.local_path)).unwrap();
        assert_eq!(content_hash(&text), doc.hash);
        assert_eq!(doc.topics, vec!["acme", "guides"]);
    }
    let one = by_url(&before, &entries[0].url);
    assert_eq!(one.title, "One");
    assert!(one.local_path.starts_with("acme/127.0.0.1/guide_one--"));

    server.reset().await;
    serve_guides(&server, "Second page, revised.").await;

    let second = sync.sync("acme", &entries).await.unwrap();
    assert_eq!((second.fetched, second.updated, second.unchanged, second.failed), (0, 1, 2, 0));

    let after = sync.store().documents().to_vec();
    assert_eq!(by_url(&after, &entries[0].url), by_url(&before, &entries[0].url));
    assert_eq!(by_url(&after, &entries[2].url), by_url(&before, &entries[2].url));
    let old_two = by_url(&before, &entries[1].url);
    let new_two = by_url(&after, &entries[1].url);
    assert_eq!(new_two.id, old_two.id);
    assert_eq!(new_two.local_path, old_two.local_path);
    assert_ne!(new_two.hash, old_two.hash);
    assert!(new_two.last_fetched > old_two.last_fetched);
    let text = fs::read_to_string(temp.path().join("docs").join(&new_two.local_path)).unwrap();
    assert!(text.contains("Second page, revised."));

    let reloaded = ManifestStore::open(temp.path().join("manifest.json")).unwrap();
    assert_eq!(reloaded.manifest(), sync.store().manifest());
}

#[tokio::test]
async fn unchanged_run_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let server = MockServer::start().await;
    serve_guides(&server, "Second page.").await;
    let entries = guide_entries(&server);

    let mut sync = orchestrator(temp.path());
    sync.sync("acme", &entries).await.unwrap();
    let writes = sync.store().writes();
    let manifest = fs::read(temp.path().join("manifest.json")).unwrap();

    let again = sync.sync("acme", &entries).await.unwrap();
    assert_eq!(again.unchanged, 3);
    assert_eq!(again.processed(), 3);
    assert_eq!(sync.store().writes(), writes);
    assert_eq!(fs::read(temp.path().join("manifest.json")).unwrap(), manifest);
}

#[tokio::test]
async fn failing_urls_do_not_stop_the_run() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let server = MockServer::start().await;
    serve(&server, "/ok", page("Ok", "Fine.")).await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logo"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"))
        .mount(&server)
        .await;

    let entries = vec![
        ProviderEntry::new(format!("{}/missing", server.uri()), "guides"),
        ProviderEntry::new("https://elsewhere.example/page", "guides"),
        ProviderEntry::new(format!("{}/logo", server.uri()), "guides"),
        ProviderEntry::new(format!("{}/ok", server.uri()), "guides"),
    ];

    let mut sync = orchestrator(temp.path());
    let summary = sync.sync("acme", &entries).await.unwrap();
    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.failed, 3);
    assert!(!summary.is_success());

    let failed: Vec<&str> = summary.errors.iter().map(|e| e.url.as_str()).collect();
    assert_eq!(
        failed,
        vec![
            entries[0].url.as_str(),
            entries[1].url.as_str(),
            entries[2].url.as_str()
        ]
    );
    assert!(summary.errors[0].reason.contains("404"));
    assert!(summary.errors[1].reason.contains("elsewhere.example"));
    assert!(summary.errors[2].reason.starts_with("extraction failed"));

    assert_eq!(sync.store().documents().len(), 1);
    assert_eq!(sync.store().documents()[0].url, entries[3].url);
}

#[tokio::test]
async fn cancelled_before_start_touches_nothing() {
    let temp = TempDir::new().unwrap();
    let server = MockServer::start().await;
    serve_guides(&server, "Second page.").await;

    let token = CancellationToken::new();
    token.cancel();
    let mut sync = orchestrator(temp.path());
    let summary = sync
        .sync_until("acme", &guide_entries(&server), &token)
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.processed(), 0);
    assert_eq!(sync.store().writes(), 0);
    assert!(!temp.path().join("manifest.json").exists());
    assert!(server.received_requests().await.unwrap().is_empty());
}

/// Serves a fixed page and cancels the run once it has been fetched.
struct CancellingFetcher {
    token: CancellationToken,
}

#[async_trait::async_trait]
impl Fetcher for CancellingFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError> {
        self.token.cancel();
        let html = page("Stub", url);
        Ok(FetchOutput {
            metadata: FetchMetadata {
                original_url: url.to_string(),
                final_url: url.to_string(),
                redirect_count: 0,
                content_type: Some("text/html".into()),
                byte_len: html.len() as u64,
            },
            bytes: Bytes::from(html),
        })
    }
}

#[tokio::test]
async fn cancellation_stops_at_the_next_entry() {
    let temp = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let config = config(temp.path());
    let store =
        ManifestStore::open_with_clock(temp.path().join("manifest.json"), config.clock.clone())
            .unwrap();
    let mut sync = SyncOrchestrator::new(
        config,
        store,
        Arc::new(CancellingFetcher {
            token: token.clone(),
        }),
        Arc::new(StaticMarkupExtractor),
    )
    .unwrap();
    let entries = vec![
        ProviderEntry::new("https://docs.acme.dev/a", "guides"),
        ProviderEntry::new("https://docs.acme.dev/b", "guides"),
    ];

    let summary = sync.sync_until("acme", &entries, &token).await.unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.fetched, 1);
    assert!(!summary.is_success());

    let reloaded = ManifestStore::open(temp.path().join("manifest.json")).unwrap();
    assert_eq!(reloaded.documents().len(), 1);
    assert_eq!(reloaded.documents()[0].url, "https://docs.acme.dev/a");
}

#[tokio::test]
async fn sync_one_creates_then_skips() {
    let temp = TempDir::new().unwrap();
    let server = MockServer::start().await;
    serve(&server, "/single", page("Single", "Only page.")).await;
    let entry = ProviderEntry::new(format!("{}/single", server.uri()), "reference");

    let mut sync = orchestrator(temp.path());
    let first = sync.sync_one("zeta", &entry).await.unwrap();
    assert_eq!(first.fetched, 1);
    let second = sync.sync_one("zeta", &entry).await.unwrap();
    assert_eq!(second.unchanged, 1);

    let store = sync.into_store();
    let doc = store.get_by_url("zeta", &entry.url).unwrap();
    assert_eq!(doc.category, "reference");
    assert_eq!(doc.title, "Single");
}

#[tokio::test]
async fn content_write_failure_aborts_the_run() {
    init_logging();
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("docs"), "not a directory").unwrap();
    let server = MockServer::start().await;
    serve_guides(&server, "Second page.").await;

    let mut sync = orchestrator(temp.path());
    let err = sync
        .sync("acme", &guide_entries(&server))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Content { .. }));
    assert!(sync.store().documents().is_empty());
    assert!(!temp.path().join("manifest.json").exists());
}

#[tokio::test]
async fn failed_refetch_keeps_the_stored_document() {
    let temp = TempDir::new().unwrap();
    let server = MockServer::start().await;
    serve_guides(&server, "Second page.").await;
    let entries = guide_entries(&server);

    let mut sync = orchestrator(temp.path());
    sync.sync("acme", &entries).await.unwrap();
    let before = sync.store().documents().to_vec();
    let writes = sync.store().writes();

    server.reset().await;
    serve(&server, "/guide/one", page("One", "First page.")).await;
    Mock::given(method("GET"))
        .and(path("/guide/two"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    serve(&server, "/guide/three", page("Three", "Third page, revised.")).await;

    let summary = sync.sync("acme", &entries).await.unwrap();
    assert_eq!((summary.updated, summary.unchanged, summary.failed), (1, 1, 1));
    assert_eq!(summary.errors[0].url, entries[1].url);
    assert_eq!(sync.store().writes(), writes + 1);

    let after = sync.store().documents().to_vec();
    let two = by_url(&after, &entries[1].url);
    assert_eq!(two, by_url(&before, &entries[1].url));
    let text = fs::read_to_string(temp.path().join("docs").join(&two.local_path)).unwrap();
    assert_eq!(content_hash(&text), two.hash);
}

#[tokio::test]
async fn occupied_storage_path_is_never_overwritten() {
    let temp = TempDir::new().unwrap();
    let server = MockServer::start().await;
    serve(&server, "/guide", page("Guide", "Acme guide.")).await;
    let url = format!("{}/guide", server.uri());

    let mut sync = orchestrator(temp.path());
    let taken = local_path_for("acme", &url);
    let file = temp.path().join("docs").join(&taken);
    fs::create_dir_all(file.parent().unwrap()).unwrap();
    fs::write(&file, "# Other\n").unwrap();
    let mut other = Document::new(
        "acme",
        "https://docs.acme.dev/other",
        taken.clone(),
        content_hash("# Other\n"),
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    );
    other.category = "guides".into();
    sync.store_mut().add(other).unwrap();

    let summary = sync
        .sync_one("acme", &ProviderEntry::new(&url, "guides"))
        .await
        .unwrap();
    assert_eq!(summary.failed, 1);
    assert!(summary.errors[0].reason.contains(&taken));

    assert_eq!(fs::read_to_string(&file).unwrap(), "# Other\n");
    let stored = sync.store().get_by_local_path(&taken).unwrap();
    assert_eq!(stored.url, "https://docs.acme.dev/other");
    assert_eq!(content_hash(&fs::read_to_string(&file).unwrap()), stored.hash);
}

#[tokio::test]
async fn providers_with_similar_names_keep_separate_files() {
    let temp = TempDir::new().unwrap();
    let server = MockServer::start().await;
    serve(&server, "/guide", page("Guide", "Shared guide.")).await;
    let entry = ProviderEntry::new(format!("{}/guide", server.uri()), "guides");

    let mut sync = orchestrator(temp.path());
    for provider in ["acme corp", "acme_corp"] {
        let summary = sync.sync_one(provider, &entry).await.unwrap();
        assert_eq!(summary.fetched, 1, "{provider}");
    }

    let docs = sync.store().documents();
    assert_eq!(docs.len(), 2);
    assert_ne!(docs[0].local_path, docs[1].local_path);
    for doc in docs {
        let text = fs::read_to_string(temp.path().join("docs").join(&doc.local_path)).unwrap();
        assert_eq!(content_hash(&text), doc.hash);
    }
}

#[tokio::test]
async fn category_follows_configuration_without_refetching_content() {
    let temp = TempDir::new().unwrap();
    let server = MockServer::start().await;
    serve(&server, "/guide", page("Guide", "Stable.")).await;
    let url = format!("{}/guide", server.uri());

    let mut sync = orchestrator(temp.path());
    sync.sync_one("acme", &ProviderEntry::new(&url, "guides"))
        .await
        .unwrap();
    let before = sync.store().get_by_url("acme", &url).unwrap().clone();
    let writes = sync.store().writes();

    let summary = sync
        .sync_one("acme", &ProviderEntry::new(&url, "tutorials"))
        .await
        .unwrap();
    assert_eq!(summary.unchanged, 1);
    assert_eq!(sync.store().writes(), writes + 1);

    let after = sync.store().get_by_url("acme", &url).unwrap();
    assert_eq!(after.category, "tutorials");
    assert_eq!(after.hash, before.hash);
    assert_eq!(after.last_fetched, before.last_fetched);
    assert_eq!(sync.store().list_categories(), vec!["tutorials"]);
}

#[test]
fn invalid_configuration_is_refused() {
    let temp = TempDir::new().unwrap();
    let mut config = config(temp.path());
    config.rate_limit.per_second = f64::MIN_POSITIVE / 2.0;
    let store = ManifestStore::open(temp.path().join("manifest.json")).unwrap();

    let err = SyncOrchestrator::with_defaults(config, store).err().unwrap();
    assert!(matches!(err, ConfigError::InvalidRate(_)));
}
