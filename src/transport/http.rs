use reqwest::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use super::{
    Connection, ConnectionPool, PublishRequest, RequestSigner, TransportError, TransportStats,
    TransportStatsSource,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Headers reqwest derives from the URL and body on its own.
const DERIVED_HEADERS: &[&str] = &["host", "content-length"];

/// Connection pool over a shared reqwest client, bounded to `max_connections`
/// concurrent leases.
pub struct HttpConnectionPool {
    client: Client,
    endpoint: String,
    max_connections: usize,
    leases: Arc<Semaphore>,
    pending: AtomicUsize,
    vended_total: AtomicUsize,
}

impl HttpConnectionPool {
    /// Returns an error if the HTTP client fails to build (e.g., TLS configuration issues).
    pub fn new(endpoint: impl Into<String>, max_connections: usize) -> Result<Self, String> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {}", e))?;
        let max_connections = max_connections.max(1);
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            max_connections,
            leases: Arc::new(Semaphore::new(max_connections)),
            pending: AtomicUsize::new(0),
            vended_total: AtomicUsize::new(0),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl ConnectionPool for HttpConnectionPool {
    async fn acquire(&self) -> Result<Box<dyn Connection>, TransportError> {
        let pending = PendingAcquisition::start(&self.pending);
        let permit = self.leases.clone().acquire_owned().await;
        drop(pending);

        let permit = permit.map_err(|e| TransportError::Acquire(e.to_string()))?;
        self.vended_total.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(HttpConnection {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            _lease: permit,
        }))
    }
}

/// Counts a waiter for as long as its acquire future is alive.
struct PendingAcquisition<'a>(&'a AtomicUsize);

impl<'a> PendingAcquisition<'a> {
    fn start(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for PendingAcquisition<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl TransportStatsSource for HttpConnectionPool {
    fn transport_stats(&self) -> TransportStats {
        let leased = self.max_connections - self.leases.available_permits();
        TransportStats {
            held_connections: leased,
            pending_acquisitions: self.pending.load(Ordering::Relaxed),
            // reqwest connects lazily inside send(); nothing is pending here
            pending_connects: 0,
            vended_connections: self.vended_total.load(Ordering::Relaxed),
            open_connections: leased,
        }
    }
}

struct HttpConnection {
    client: Client,
    endpoint: String,
    _lease: OwnedSemaphorePermit,
}

#[async_trait::async_trait]
impl Connection for HttpConnection {
    async fn send(&mut self, request: &PublishRequest) -> Result<u16, TransportError> {
        let url = format!("{}{}", self.endpoint, request.path);
        let mut builder = self.client.request(request.method.clone(), &url);
        for (name, value) in &request.headers {
            if DERIVED_HEADERS
                .iter()
                .any(|h| name.eq_ignore_ascii_case(h))
            {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        debug!(url = %url, status, "metrics request completed");
        Ok(status)
    }
}

/// Stamps requests with `x-amz-date`. Credentials are resolved outside this
/// crate; endpoints that verify signatures need a credential-aware signer.
#[derive(Debug, Default, Clone)]
pub struct DateStampSigner;

#[async_trait::async_trait]
impl RequestSigner for DateStampSigner {
    async fn sign(&self, mut request: PublishRequest) -> Result<PublishRequest, TransportError> {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        request.headers.retain(|(k, _)| !k.eq_ignore_ascii_case("x-amz-date"));
        request.headers.push(("x-amz-date".to_string(), stamp));
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use reqwest::Method;

    fn request() -> PublishRequest {
        PublishRequest {
            method: Method::POST,
            path: "/".to_string(),
            headers: vec![("content-type".to_string(), "text/plain".to_string())],
            body: Bytes::from_static(b"hello"),
        }
    }

    #[tokio::test]
    async fn date_stamp_signer_adds_single_date_header() {
        let signer = DateStampSigner;
        let signed = signer.sign(request()).await.unwrap();
        let signed = signer.sign(signed).await.unwrap();

        let stamps: Vec<_> = signed
            .headers
            .iter()
            .filter(|(k, _)| k == "x-amz-date")
            .collect();
        assert_eq!(stamps.len(), 1);
        assert_eq!(stamps[0].1.len(), "20240101T000000Z".len());
        assert_eq!(signed.header("content-type"), Some("text/plain"));
    }

    #[tokio::test]
    async fn pool_bounds_leases_and_reports_stats() {
        let pool = HttpConnectionPool::new("http://127.0.0.1:1/", 2).expect("client");
        assert_eq!(pool.endpoint(), "http://127.0.0.1:1");

        let first = pool.acquire().await.unwrap();
        let second = pool.acquire().await.unwrap();
        let stats = pool.transport_stats();
        assert_eq!(stats.held_connections, 2);
        assert_eq!(stats.vended_connections, 2);

        let third = tokio::time::timeout(Duration::from_millis(20), pool.acquire()).await;
        assert!(third.is_err(), "third lease should wait for a free slot");

        drop(first);
        let third = tokio::time::timeout(Duration::from_secs(1), pool.acquire())
            .await
            .expect("lease freed")
            .unwrap();
        drop(second);
        drop(third);
        assert_eq!(pool.transport_stats().held_connections, 0);
        assert_eq!(pool.transport_stats().pending_acquisitions, 0);
    }

    #[tokio::test]
    async fn send_to_unreachable_endpoint_is_network_error() {
        let pool = HttpConnectionPool::new("http://127.0.0.1:1", 1).expect("client");
        let mut conn = pool.acquire().await.unwrap();
        let err = conn.send(&request()).await.unwrap_err();
        assert!(matches!(err, TransportError::Network(_)));
    }
}
