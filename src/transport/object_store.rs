use bytes::Bytes;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::Mutex;

use super::{ObjectStore, TransportError};

/// Object store held in memory. Useful for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Bytes>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<_> = self.objects.lock().await.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, path: &str, body: Bytes) -> Result<(), TransportError> {
        self.objects.lock().await.insert(path.to_string(), body);
        Ok(())
    }

    async fn get_object(&self, path: &str) -> Result<Bytes, TransportError> {
        self.objects
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(path.to_string()))
    }
}

/// Object store rooted at a local directory. Object paths map to relative
/// file paths; absolute paths and `..` are rejected.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, TransportError> {
        let relative = Path::new(path);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || path.is_empty() {
            return Err(TransportError::Io(format!("invalid object path: {}", path)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait::async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_object(&self, path: &str, body: Bytes) -> Result<(), TransportError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TransportError::Io(e.to_string()))?;
        }
        tokio::fs::write(&target, &body)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn get_object(&self, path: &str) -> Result<Bytes, TransportError> {
        let target = self.resolve(path)?;
        match tokio::fs::read(&target).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TransportError::NotFound(path.to_string()))
            }
            Err(e) => Err(TransportError::Io(e.to_string())),
        }
    }
}

/// Object store reached over plain HTTP PUT/GET at `{base_url}/{bucket}/{path}`.
pub struct HttpObjectStore {
    client: Client,
    base_url: String,
    bucket: String,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>, bucket: impl Into<String>) -> Result<Self, String> {
        let client = Client::builder()
            .build()
            .map_err(|e| format!("failed to build HTTP client: {}", e))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
        })
    }

    fn object_url(&self, path: &str) -> String {
        let encoded: Vec<_> = path
            .trim_start_matches('/')
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}/{}", self.base_url, self.bucket, encoded.join("/"))
    }
}

#[async_trait::async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put_object(&self, path: &str, body: Bytes) -> Result<(), TransportError> {
        let response = self
            .client
            .put(self.object_url(path))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    async fn get_object(&self, path: &str) -> Result<Bytes, TransportError> {
        let response = self
            .client
            .get(self.object_url(path))
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(TransportError::NotFound(path.to_string())),
            status if !status.is_success() => Err(TransportError::Status {
                status: status.as_u16(),
            }),
            _ => response
                .bytes()
                .await
                .map_err(|e| TransportError::Network(e.to_string())),
        }
    }
}
