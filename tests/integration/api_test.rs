//! Read API tests against a live listener

use serde_json::Value;
use std::net::SocketAddr;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tradespike::api;
use tradespike::state::{Alert, MetricsSnapshot, StateStore};

const ALLOWED_ORIGIN: &str = "http://localhost:5173";

struct TestServer {
    addr: SocketAddr,
    store: StateStore,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<std::io::Result<()>>,
    _dir: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(dir.path()).await.unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown, rx) = watch::channel(false);
        let app = api::router(store.clone(), &[ALLOWED_ORIGIN.to_string()]);
        let handle = tokio::spawn(api::serve(listener, app, rx));

        Self {
            addr,
            store,
            shutdown,
            handle,
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        self.handle.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;

    let resp = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert!(body["time"].as_i64().unwrap() > 1_600_000_000_000);

    server.stop().await;
}

#[tokio::test]
async fn test_metrics_not_ready_then_ready() {
    let server = TestServer::start().await;

    let resp = reqwest::get(server.url("/metrics")).await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "detail": "metrics not ready" }));

    let snap = MetricsSnapshot {
        last_updated_ms: 1_700_000_000_123,
        trades_per_sec: 50,
        window_size: 30,
        z: 5.2947,
        is_spike: true,
    };
    server.store.write_metrics(&snap).await.unwrap();

    let resp = reqwest::get(server.url("/metrics")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: MetricsSnapshot = resp.json().await.unwrap();
    assert_eq!(body, snap);

    server.stop().await;
}

#[tokio::test]
async fn test_alerts_pagination_newest_first() {
    let server = TestServer::start().await;

    let resp = reqwest::get(server.url("/alerts")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Vec<Value> = resp.json().await.unwrap();
    assert!(body.is_empty());

    for i in 0..120 {
        let alert = Alert {
            ts_ms: 1_700_000_000_000 + i * 1000,
            count: 40 + i as u64,
            z: 3.5,
        };
        server.store.append_alert(&alert).await.unwrap();
    }

    let resp = reqwest::get(server.url("/alerts?limit=50")).await.unwrap();
    let body: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(body.len(), 50);

    let log = tokio::fs::read_to_string(server.store.alerts_path())
        .await
        .unwrap();
    let expected: Vec<Value> = log
        .lines()
        .rev()
        .take(50)
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(body, expected);
    assert_eq!(body[0]["count"], 159);

    let resp = reqwest::get(server.url("/alerts")).await.unwrap();
    let body: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(body.len(), 50);

    let resp = reqwest::get(server.url("/alerts?limit=500")).await.unwrap();
    let body: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(body.len(), 120);

    server.stop().await;
}

#[tokio::test]
async fn test_cors_allows_configured_origin_only() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(server.url("/health"))
        .header("Origin", ALLOWED_ORIGIN)
        .send()
        .await
        .unwrap();
    let headers = resp.headers();
    assert_eq!(
        headers.get("access-control-allow-origin").unwrap(),
        ALLOWED_ORIGIN
    );
    assert_eq!(
        headers.get("access-control-allow-credentials").unwrap(),
        "true"
    );

    let resp = client
        .get(server.url("/health"))
        .header("Origin", "http://evil.example")
        .send()
        .await
        .unwrap();
    let allowed = resp.headers().get("access-control-allow-origin");
    assert!(allowed.is_none());

    server.stop().await;
}
