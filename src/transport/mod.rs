//! Capability interfaces for the collaborators the publisher drives:
//! request signing, pooled connections, and the backup object store.

mod http;
mod object_store;

pub use http::{DateStampSigner, HttpConnectionPool};
pub use object_store::{HttpObjectStore, LocalObjectStore, MemoryObjectStore};

use bytes::Bytes;
use reqwest::Method;

/// Errors surfaced by collaborator implementations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Signing(String),
    Acquire(String),
    Network(String),
    Status { status: u16 },
    NotFound(String),
    Io(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Signing(msg) => write!(f, "signing failed: {}", msg),
            TransportError::Acquire(msg) => write!(f, "connection acquisition failed: {}", msg),
            TransportError::Network(msg) => write!(f, "network error: {}", msg),
            TransportError::Status { status } => write!(f, "unexpected HTTP status {}", status),
            TransportError::NotFound(path) => write!(f, "object not found: {}", path),
            TransportError::Io(msg) => write!(f, "io error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

/// An outgoing request before and after signing.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl PublishRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Signs a request for the metrics service.
#[async_trait::async_trait]
pub trait RequestSigner: Send + Sync {
    async fn sign(&self, request: PublishRequest) -> Result<PublishRequest, TransportError>;
}

/// A leased connection. Dropping it returns the lease to the pool.
#[async_trait::async_trait]
pub trait Connection: Send {
    /// Send the request and return the response status code.
    async fn send(&mut self, request: &PublishRequest) -> Result<u16, TransportError>;
}

/// Hands out connections to the metrics endpoint.
#[async_trait::async_trait]
pub trait ConnectionPool: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn Connection>, TransportError>;
}

/// Durable storage for backup documents.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, path: &str, body: Bytes) -> Result<(), TransportError>;
    async fn get_object(&self, path: &str) -> Result<Bytes, TransportError>;
}

/// Point-in-time connection pool gauges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub held_connections: usize,
    pub pending_acquisitions: usize,
    pub pending_connects: usize,
    pub vended_connections: usize,
    pub open_connections: usize,
}

/// Anything that can report [`TransportStats`].
pub trait TransportStatsSource: Send + Sync {
    fn transport_stats(&self) -> TransportStats;
}
