//! Integration tests for the worker controller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Url;

use ft_common::{ClientMessage, ManualClock, VersionDescriptor, WorkerMessage};
use ft_worker::{
    CacheError, CacheMode, CacheStorage, ChannelWorkerHost, FetchOutcome,
    MemoryCacheStorage, Network, NetworkError, Request, Response, WorkerConfig, WorkerController,
    WorkerError, WorkerState,
};

const ORIGIN: &str = "https://budget.example";

/// Network double answering by path, recording every request.
#[derive(Default)]
struct ScriptedNetwork {
    routes: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    seen: Mutex<Vec<Request>>,
}

impl ScriptedNetwork {
    fn serve(&self, path: &str, response: Response) {
        self.routes.lock().unwrap().insert(path.to_string(), response);
    }

    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn seen(&self) -> Vec<Request> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        self.seen.lock().unwrap().push(request.clone());
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Transport("connection refused".to_string()));
        }
        let routes = self.routes.lock().unwrap();
        Ok(routes
            .get(request.url.path())
            .cloned()
            .unwrap_or_else(|| Response::new(404)))
    }
}

/// Cache storage whose every operation fails.
struct BrokenCache;

#[async_trait]
impl CacheStorage for BrokenCache {
    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        Err(CacheError::Storage("disk gone".to_string()))
    }
    async fn open(&self, _cache: &str) -> Result<(), CacheError> {
        Err(CacheError::Storage("disk gone".to_string()))
    }
    async fn delete(&self, _cache: &str) -> Result<bool, CacheError> {
        Err(CacheError::Storage("disk gone".to_string()))
    }
    async fn match_in(&self, _cache: &str, _key: &str) -> Result<Option<Response>, CacheError> {
        Err(CacheError::Storage("disk gone".to_string()))
    }
    async fn put(&self, _cache: &str, _key: &str, _response: Response) -> Result<(), CacheError> {
        Err(CacheError::QuotaExceeded)
    }
    async fn entry_count(&self, _cache: &str) -> Result<Option<usize>, CacheError> {
        Err(CacheError::Storage("disk gone".to_string()))
    }
}

/// Memory storage whose listing is slow, stretching activation out.
struct SlowCache {
    inner: MemoryCacheStorage,
    delay: Duration,
}

#[async_trait]
impl CacheStorage for SlowCache {
    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.keys().await
    }
    async fn open(&self, cache: &str) -> Result<(), CacheError> {
        self.inner.open(cache).await
    }
    async fn delete(&self, cache: &str) -> Result<bool, CacheError> {
        self.inner.delete(cache).await
    }
    async fn match_in(&self, cache: &str, key: &str) -> Result<Option<Response>, CacheError> {
        self.inner.match_in(cache, key).await
    }
    async fn put(&self, cache: &str, key: &str, response: Response) -> Result<(), CacheError> {
        self.inner.put(cache, key, response).await
    }
    async fn entry_count(&self, cache: &str) -> Result<Option<usize>, CacheError> {
        self.inner.entry_count(cache).await
    }
}

struct Harness {
    worker: WorkerController,
    caches: Arc<MemoryCacheStorage>,
    network: Arc<ScriptedNetwork>,
    host: Arc<ChannelWorkerHost>,
}

fn descriptor_json(version: &str) -> Response {
    Response::ok(format!(r#"{{"version":"{version}","build":"42"}}"#))
        .with_header("Content-Type", "application/json")
}

fn deployed_network() -> Arc<ScriptedNetwork> {
    let network = Arc::new(ScriptedNetwork::default());
    network.serve("/", Response::ok("<html>root</html>"));
    network.serve("/index.html", Response::ok("<html>shell</html>"));
    network.serve("/public/manifest.json", Response::ok("{}"));
    network.serve("/public/icons/icon-192.png", Response::ok(vec![1u8; 16]));
    network.serve("/public/icons/icon-512.png", Response::ok(vec![2u8; 32]));
    network.serve("/public/version.json", descriptor_json("1.0.0"));
    network
}

fn harness_with(config: WorkerConfig) -> Harness {
    let caches = Arc::new(MemoryCacheStorage::new());
    let network = deployed_network();
    let host = Arc::new(ChannelWorkerHost::default());
    let worker = WorkerController::new(config, caches.clone(), network.clone(), host.clone())
        .unwrap()
        .with_clock(Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 4, 1, 12, 0, 0).unwrap(),
        )));
    Harness {
        worker,
        caches,
        network,
        host,
    }
}

fn harness() -> Harness {
    harness_with(WorkerConfig::for_origin(ORIGIN))
}

fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

fn body_of(outcome: &FetchOutcome) -> String {
    outcome.response().expect("worker should respond").text()
}

#[tokio::test]
async fn test_install_precaches_shell() {
    let h = harness();
    let report = h.worker.install().await.unwrap();

    assert_eq!(report.precached.len(), 6);
    assert!(report.skipped.is_empty());
    assert_eq!(h.worker.state(), WorkerState::Installed);

    let keys = h.caches.entry_keys("ft-static-v1");
    assert!(keys.contains(&"/public/version.json".to_string()));
    assert!(keys.contains(&"/index.html".to_string()));

    // The descriptor is fetched fresh even at install time.
    let descriptor_fetch = h
        .network
        .seen()
        .into_iter()
        .find(|r| r.url.path() == "/public/version.json")
        .unwrap();
    assert_eq!(descriptor_fetch.cache, CacheMode::NoStore);
    assert!(descriptor_fetch.url.query().unwrap_or("").starts_with("t="));
}

#[tokio::test]
async fn test_install_skips_missing_entries() {
    let h = harness();
    h.network.serve("/public/icons/icon-512.png", Response::new(404));

    let report = h.worker.install().await.unwrap();
    assert_eq!(report.precached.len(), 5);
    assert_eq!(report.skipped, vec!["/public/icons/icon-512.png".to_string()]);
    assert_eq!(h.worker.state(), WorkerState::Installed);
}

#[tokio::test]
async fn test_install_twice_is_rejected() {
    let h = harness();
    h.worker.install().await.unwrap();
    let err = h.worker.install().await.unwrap_err();
    assert!(matches!(err, WorkerError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn test_offline_after_install() {
    let h = harness();
    h.worker.install().await.unwrap();
    h.network.set_offline(true);

    let nav = h.worker.handle_fetch(&Request::navigate(url("/"))).await.unwrap();
    assert_eq!(body_of(&nav), "<html>shell</html>");

    let root = h.worker.handle_fetch(&Request::get(url("/"))).await.unwrap();
    assert_eq!(body_of(&root), "<html>root</html>");

    let missing = h
        .worker
        .handle_fetch(&Request::get(url("/assets/never-seen.js")))
        .await
        .unwrap();
    let missing = missing.response().unwrap();
    assert_eq!(missing.status, 503);
    assert_eq!(missing.text(), "Offline");
}

#[tokio::test]
async fn test_navigation_offline_without_any_cache() {
    let h = harness();
    h.network.set_offline(true);
    let nav = h
        .worker
        .handle_fetch(&Request::navigate(url("/budgets/2025")))
        .await
        .unwrap();
    assert_eq!(nav.response().unwrap().status, 503);
}

#[tokio::test]
async fn test_navigation_fills_runtime_shell() {
    let h = harness();
    h.network.serve("/reports", Response::ok("<html>shell</html>"));
    let nav = h.worker.handle_fetch(&Request::navigate(url("/reports"))).await.unwrap();
    assert_eq!(nav.response().unwrap().status, 200);
    assert_eq!(h.caches.entry_keys("ft-runtime-v1"), vec!["/index.html".to_string()]);
}

#[tokio::test]
async fn test_activation_removes_stale_caches() {
    let h = harness();
    h.caches.put("ft-static-v0", "/", Response::ok("old")).await.unwrap();
    h.caches.put("ft-runtime-v0", "/x", Response::ok("old")).await.unwrap();
    h.caches.put("ft-runtime-v1", "/leftover", Response::ok("old")).await.unwrap();

    h.worker.install().await.unwrap();
    let mut changes = h.host.subscribe_controller_changes();
    let report = h.worker.activate().await.unwrap();

    assert_eq!(report.deleted_caches, vec!["ft-runtime-v0", "ft-static-v0"]);
    assert!(report.runtime_reset);
    let mut remaining = h.caches.keys().await.unwrap();
    remaining.sort();
    assert_eq!(remaining, vec!["ft-runtime-v1", "ft-static-v1"]);
    assert_eq!(h.caches.entry_count("ft-runtime-v1").await.unwrap(), Some(0));
    assert_eq!(h.caches.entry_count("ft-static-v1").await.unwrap(), Some(6));

    assert!(changes.recv().await.is_ok());
    assert_eq!(h.worker.state(), WorkerState::Activated);
}

#[tokio::test]
async fn test_activate_requires_install() {
    let h = harness();
    assert!(h.worker.activate().await.is_err());
    assert_eq!(h.worker.state(), WorkerState::Parsed);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_skip_waiting_broadcasts_after_cleanup() {
    let caches = Arc::new(SlowCache {
        inner: MemoryCacheStorage::new(),
        delay: Duration::from_millis(200),
    });
    caches.put("ft-static-v0", "/", Response::ok("old")).await.unwrap();
    let host = Arc::new(ChannelWorkerHost::default());
    let worker = Arc::new(
        WorkerController::new(
            WorkerConfig::for_origin(ORIGIN),
            caches.clone(),
            deployed_network(),
            host.clone(),
        )
        .unwrap(),
    );
    let mut page = host.subscribe();
    worker.install().await.unwrap();

    // Two tabs ask for the handoff at nearly the same moment.
    let first = tokio::spawn({
        let worker = worker.clone();
        async move { worker.handle_message(ClientMessage::SkipWaiting).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = tokio::spawn({
        let worker = worker.clone();
        async move { worker.handle_message(ClientMessage::SkipWaiting).await }
    });

    page.recv().await.unwrap();
    assert_eq!(worker.state(), WorkerState::Activated);
    let mut names = caches.keys().await.unwrap();
    names.sort();
    assert_eq!(names, vec!["ft-runtime-v1", "ft-static-v1"]);

    assert_eq!(first.await.unwrap().unwrap(), 1);
    assert_eq!(second.await.unwrap().unwrap(), 1);
    page.recv().await.unwrap();
}

#[tokio::test]
async fn test_skip_waiting_activates_then_broadcasts() {
    let h = harness();
    h.caches.put("ft-static-v0", "/", Response::ok("old")).await.unwrap();
    let mut page = h.host.subscribe();

    h.worker.install().await.unwrap();
    h.network.serve("/public/version.json", descriptor_json("1.1.0"));

    let sent = h.worker.handle_message(ClientMessage::SkipWaiting).await.unwrap();
    assert_eq!(sent, 1);
    assert_eq!(h.worker.state(), WorkerState::Activated);

    let message = page.recv().await.unwrap();
    assert_eq!(
        message,
        WorkerMessage::ReloadRequired {
            version: Some(VersionDescriptor::new("1.1.0").with_build("42")),
        }
    );
    // Cleanup happened before the page heard about it.
    assert!(!h.caches.keys().await.unwrap().contains(&"ft-static-v0".to_string()));
}

#[tokio::test]
async fn test_skip_waiting_with_descriptor_unreachable() {
    let h = harness();
    let mut page = h.host.subscribe();
    h.worker.install().await.unwrap();
    h.network.set_offline(true);

    h.worker.handle_message(ClientMessage::SkipWaiting).await.unwrap();
    assert_eq!(
        page.recv().await.unwrap(),
        WorkerMessage::ReloadRequired { version: None }
    );
}

#[tokio::test]
async fn test_skip_waiting_with_garbage_descriptor() {
    let h = harness();
    let mut page = h.host.subscribe();
    h.worker.install().await.unwrap();
    h.network.serve("/public/version.json", Response::ok("<html>oops</html>"));

    h.worker.handle_message(ClientMessage::SkipWaiting).await.unwrap();
    assert_eq!(page.recv().await.unwrap().version(), None);
}

#[tokio::test]
async fn test_skip_waiting_before_install_is_deferred() {
    let h = harness();
    let mut page = h.host.subscribe();

    assert_eq!(h.worker.handle_message(ClientMessage::SkipWaiting).await.unwrap(), 0);
    assert_eq!(h.worker.state(), WorkerState::Parsed);

    h.worker.install().await.unwrap();
    assert_eq!(h.worker.state(), WorkerState::Activated);
    assert!(matches!(
        page.recv().await.unwrap(),
        WorkerMessage::ReloadRequired { .. }
    ));
}

#[tokio::test]
async fn test_skip_waiting_when_already_active() {
    let h = harness();
    let mut page = h.host.subscribe();
    h.worker.install().await.unwrap();
    h.worker.activate().await.unwrap();

    h.worker.handle_message(ClientMessage::SkipWaiting).await.unwrap();
    assert_eq!(h.worker.state(), WorkerState::Activated);
    assert!(page.recv().await.is_ok());
}

#[tokio::test]
async fn test_unknown_raw_message_is_ignored() {
    let h = harness();
    h.worker.install().await.unwrap();
    assert_eq!(h.worker.handle_raw_message(r#"{"type":"PING"}"#).await.unwrap(), 0);
    assert_eq!(h.worker.state(), WorkerState::Installed);

    assert_eq!(
        h.worker
            .handle_raw_message(r#"{"type":"SKIP_WAITING"}"#)
            .await
            .unwrap(),
        0
    );
    assert_eq!(h.worker.state(), WorkerState::Activated);
}

#[tokio::test]
async fn test_descriptor_is_network_first() {
    let h = harness();
    h.worker.install().await.unwrap();
    h.network.serve("/public/version.json", descriptor_json("2.0.0"));

    let outcome = h
        .worker
        .handle_fetch(&Request::get(url("/public/version.json")))
        .await
        .unwrap();
    let served: VersionDescriptor = outcome.response().unwrap().json().unwrap();
    assert_eq!(served.version, "2.0.0");

    let last = h.network.seen().pop().unwrap();
    assert_eq!(last.cache, CacheMode::NoStore);
    let expected_token = Utc
        .with_ymd_and_hms(2025, 4, 1, 12, 0, 0)
        .unwrap()
        .timestamp_millis()
        .to_string();
    assert_eq!(last.url.query(), Some(format!("t={expected_token}").as_str()));

    let cached = h
        .caches
        .match_in("ft-runtime-v1", "/public/version.json")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.json::<VersionDescriptor>().unwrap().version, "2.0.0");
}

#[tokio::test]
async fn test_descriptor_uses_build_stamp() {
    let mut config = WorkerConfig::for_origin(ORIGIN);
    config.build_timestamp = "2025-03-01T10:00:00.000Z".to_string();
    let h = harness_with(config);

    h.worker
        .handle_fetch(&Request::get(url("/public/version.json?t=1")))
        .await
        .unwrap();
    let last = h.network.seen().pop().unwrap();
    let expected = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap().timestamp_millis();
    assert_eq!(last.url.query(), Some(format!("t={expected}").as_str()));
}

#[tokio::test]
async fn test_descriptor_falls_back_offline() {
    let h = harness();
    h.worker.install().await.unwrap();
    h.network.set_offline(true);

    let outcome = h
        .worker
        .handle_fetch(&Request::get(url("/public/version.json")))
        .await
        .unwrap();
    let served: VersionDescriptor = outcome.response().unwrap().json().unwrap();
    assert_eq!(served.version, "1.0.0");
}

#[tokio::test]
async fn test_descriptor_offline_and_uncached_fails() {
    let h = harness();
    h.network.set_offline(true);
    let err = h
        .worker
        .handle_fetch(&Request::get(url("/public/version.json")))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_error_responses_are_not_cached() {
    let h = harness();
    h.network.serve("/assets/app.js", Response::new(500));

    let outcome = h.worker.handle_fetch(&Request::get(url("/assets/app.js"))).await.unwrap();
    assert_eq!(outcome.response().unwrap().status, 500);
    assert!(h.caches.entry_keys("ft-static-v1").is_empty());

    h.network.serve("/assets/app.js", Response::ok("console.log(1)"));
    h.worker.handle_fetch(&Request::get(url("/assets/app.js"))).await.unwrap();
    assert_eq!(h.caches.entry_keys("ft-static-v1"), vec!["/assets/app.js".to_string()]);
}

#[tokio::test]
async fn test_cross_origin_and_post_pass_through() {
    let h = harness();
    let cross = Request::get(Url::parse("https://cdn.example/lib.js").unwrap());
    assert_eq!(h.worker.handle_fetch(&cross).await.unwrap(), FetchOutcome::Passthrough);

    let mut post = Request::get(url("/api/sync"));
    post.method = reqwest::Method::POST;
    assert_eq!(h.worker.handle_fetch(&post).await.unwrap(), FetchOutcome::Passthrough);
    assert!(h.network.seen().is_empty());
}

#[tokio::test]
async fn test_broken_cache_still_serves_network() {
    let network = deployed_network();
    let host = Arc::new(ChannelWorkerHost::default());
    let worker = WorkerController::new(
        WorkerConfig::for_origin(ORIGIN),
        Arc::new(BrokenCache),
        network.clone(),
        host,
    )
    .unwrap();

    let report = worker.install().await.unwrap();
    assert!(report.precached.is_empty());
    assert_eq!(report.skipped.len(), 6);

    let activation = worker.activate().await.unwrap();
    assert!(!activation.runtime_reset);

    let outcome = worker.handle_fetch(&Request::navigate(url("/"))).await.unwrap();
    assert_eq!(body_of(&outcome), "<html>root</html>");
    let outcome = worker
        .handle_fetch(&Request::get(url("/public/version.json")))
        .await
        .unwrap();
    assert!(outcome.response().unwrap().is_ok());
}

#[tokio::test]
async fn test_development_host_never_caches() {
    let caches = Arc::new(MemoryCacheStorage::new());
    caches.put("ft-static-v0", "/", Response::ok("old")).await.unwrap();
    let network = deployed_network();
    let worker = WorkerController::new(
        WorkerConfig::for_origin("http://localhost:3000"),
        caches.clone(),
        network.clone(),
        Arc::new(ChannelWorkerHost::default()),
    )
    .unwrap();

    let report = worker.install().await.unwrap();
    assert!(report.precached.is_empty());
    assert!(network.seen().is_empty());

    worker.activate().await.unwrap();
    assert_eq!(caches.keys().await.unwrap(), vec!["ft-static-v0".to_string()]);

    let local = Url::parse("http://localhost:3000/public/version.json").unwrap();
    worker.handle_fetch(&Request::get(local.clone())).await.unwrap();
    assert_eq!(caches.total_size(), "old".len());

    network.set_offline(true);
    let outcome = worker.handle_fetch(&Request::navigate(local)).await.unwrap();
    assert_eq!(outcome.response().unwrap().status, 503);
}
