#![allow(dead_code)] // Test helpers appear unused when compiled independently

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use transfer_metrics::{
    Connection, ConnectionPool, Metric, MetricName, MetricUnit, MetricsPublisher, ObjectStore,
    PublishRequest, PublisherConfig, RequestSigner, TransportError,
};

const WAIT_ATTEMPTS: usize = 50;
const WAIT_DELAY: Duration = Duration::from_millis(100);

/// Signer that counts calls and can be told to fail.
#[derive(Default)]
pub struct RecordingSigner {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl RecordingSigner {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }
}

#[async_trait::async_trait]
impl RequestSigner for RecordingSigner {
    async fn sign(&self, mut request: PublishRequest) -> Result<PublishRequest, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(TransportError::Signing("scripted failure".to_string()));
        }
        request
            .headers
            .push(("authorization".to_string(), "test-signature".to_string()));
        Ok(request)
    }
}

/// Connection pool whose acquire/send outcomes are scripted. Once the script
/// runs out every send succeeds with 200.
#[derive(Default)]
pub struct ScriptedPool {
    acquire_failures: AtomicUsize,
    statuses: Mutex<VecDeque<u16>>,
    sent: Arc<Mutex<Vec<PublishRequest>>>,
}

impl ScriptedPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_acquires(n: usize) -> Self {
        let pool = Self::default();
        pool.acquire_failures.store(n, Ordering::SeqCst);
        pool
    }

    pub fn with_statuses(statuses: impl IntoIterator<Item = u16>) -> Self {
        let pool = Self::default();
        *pool.statuses.lock().unwrap() = statuses.into_iter().collect();
        pool
    }

    pub fn sent(&self) -> Vec<PublishRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_bodies(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|r| String::from_utf8_lossy(&r.body).into_owned())
            .collect()
    }
}

struct ScriptedConnection {
    status: u16,
    sent: Arc<Mutex<Vec<PublishRequest>>>,
}

#[async_trait::async_trait]
impl Connection for ScriptedConnection {
    async fn send(&mut self, request: &PublishRequest) -> Result<u16, TransportError> {
        self.sent.lock().unwrap().push(request.clone());
        Ok(self.status)
    }
}

#[async_trait::async_trait]
impl ConnectionPool for ScriptedPool {
    async fn acquire(&self) -> Result<Box<dyn Connection>, TransportError> {
        let failed = self
            .acquire_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(TransportError::Acquire("scripted failure".to_string()));
        }
        let status = self.statuses.lock().unwrap().pop_front().unwrap_or(200);
        Ok(Box::new(ScriptedConnection {
            status,
            sent: self.sent.clone(),
        }))
    }
}

pub fn fast_config() -> PublisherConfig {
    PublisherConfig {
        publish_interval_ms: 5,
        platform_name: "linux".to_string(),
        tool_name: "bench".to_string(),
        instance_type: "m5".to_string(),
        ..PublisherConfig::default()
    }
}

pub fn start_publisher(
    config: PublisherConfig,
    signer: Arc<dyn RequestSigner>,
    pool: Arc<dyn ConnectionPool>,
    store: Arc<dyn ObjectStore>,
) -> MetricsPublisher {
    MetricsPublisher::start(config, signer, pool, store)
}

/// `n` samples with distinct aggregation keys, one per second from `start_ms`.
pub fn distinct_samples(n: u64, start_ms: u64) -> Vec<Metric> {
    (0..n)
        .map(|i| {
            Metric::with_timestamp(
                MetricName::BytesUp,
                MetricUnit::Bytes,
                start_ms + i * 1000,
                (i + 1) as f64,
            )
        })
        .collect()
}

/// Number of metric members in a form-encoded PutMetricData body.
pub fn member_count(body: &str) -> usize {
    body.split('&')
        .filter(|kv| kv.starts_with("MetricData.member.") && kv.contains(".MetricName="))
        .count()
}

/// Value of a form field, if present.
pub fn form_value<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    body.split('&').find_map(|kv| {
        let (k, v) = kv.split_once('=')?;
        (k == key).then_some(v)
    })
}

pub async fn flush_and_settle(publisher: &MetricsPublisher) {
    tokio::time::timeout(Duration::from_secs(10), async {
        publisher.flush().await;
        publisher.wait_for_last_publish().await;
    })
    .await
    .expect("publisher did not drain in time");
}

#[derive(Clone)]
struct MetricsServiceState {
    requests: Arc<tokio::sync::Mutex<Vec<RecordedRequest>>>,
    status: Arc<AtomicU16>,
}

/// One request received by the mock metrics service.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct RecordedRequest {
    pub body: String,
    pub amz_date: Option<String>,
    pub content_type: Option<String>,
}

pub struct MockMetricsService {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
    status: Arc<AtomicU16>,
}

impl MockMetricsService {
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.await;
    }

    /// Status code returned to subsequent publishes.
    pub fn respond_with(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }
}

/// Find an available TCP port
pub async fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Best-effort check for whether binding to loopback is permitted in the current sandbox.
pub async fn can_bind_loopback() -> bool {
    match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => {
            drop(listener);
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => false,
        Err(_) => true, // treat other errors as non-fatal for skipping
    }
}

/// Spawn the mock metrics service, return (handle, base URL)
pub async fn spawn_mock_metrics_service(port: u16) -> (MockMetricsService, String) {
    let status = Arc::new(AtomicU16::new(200));
    let state = MetricsServiceState {
        requests: Arc::new(tokio::sync::Mutex::new(Vec::new())),
        status: status.clone(),
    };

    let app = Router::new()
        .route("/", post(put_metric_data))
        .route("/requests", get(requests))
        .route("/health", get(health))
        .with_state(state);

    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .expect("failed to bind mock metrics listener");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });
        if let Err(err) = server.await {
            eprintln!("mock metrics server error: {}", err);
        }
    });

    (
        MockMetricsService {
            shutdown_tx,
            handle,
            status,
        },
        format!("http://127.0.0.1:{}", port),
    )
}

/// Wait for a server to respond to /health
pub async fn wait_for_health(client: &reqwest::Client, base_url: &str) {
    poll_until(|| async {
        client
            .get(format!("{}/health", base_url))
            .send()
            .await
            .ok()
            .map(|_| ())
    })
    .await
    .unwrap_or_else(|| panic!("timed out waiting for {} to be healthy", base_url));
}

/// Poll /requests until the service has seen at least `min_count` publishes
pub async fn wait_for_requests(
    client: &reqwest::Client,
    base_url: &str,
    min_count: usize,
) -> Vec<RecordedRequest> {
    poll_until(|| async {
        match client.get(format!("{}/requests", base_url)).send().await.ok() {
            Some(resp) => match resp.json::<Vec<RecordedRequest>>().await.ok() {
                Some(requests) if requests.len() >= min_count => Some(requests),
                _ => None,
            },
            None => None,
        }
    })
    .await
    .unwrap_or_else(|| panic!("timed out waiting for {} requests at {}", min_count, base_url))
}

pub async fn poll_until<T, F, Fut>(mut f: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for _ in 0..WAIT_ATTEMPTS {
        if let Some(result) = f().await {
            return Some(result);
        }
        tokio::time::sleep(WAIT_DELAY).await;
    }
    None
}

async fn put_metric_data(
    State(state): State<MetricsServiceState>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.requests.lock().await.push(RecordedRequest {
        body,
        amz_date: header("x-amz-date"),
        content_type: header("content-type"),
    });
    StatusCode::from_u16(state.status.load(Ordering::SeqCst)).unwrap_or(StatusCode::OK)
}

async fn requests(State(state): State<MetricsServiceState>) -> Json<Vec<RecordedRequest>> {
    Json(state.requests.lock().await.clone())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
