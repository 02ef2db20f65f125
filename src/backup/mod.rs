//! Durable record of published batches and replay of prior records.

mod document;
mod log;
mod replay;

pub use document::{backup_path, BackupDocument, BackupEntry};
pub use log::{BackupLog, BackupRecord, ReplayRecord};
pub use replay::{
    dashboard_link, load_replay, next_replay_id, relocate_timestamps, LoadedReplay, ReplayError,
    ReplaySummary,
};

use bytes::Bytes;
use chrono::Utc;

use crate::dimensions::Dimensions;
use crate::metric::Metric;
use crate::transport::{ObjectStore, TransportError};

#[derive(Debug, Clone, PartialEq)]
pub enum BackupError {
    Serialize(String),
    Parse(String),
    Store(TransportError),
}

impl std::fmt::Display for BackupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupError::Serialize(msg) => write!(f, "backup serialization failed: {}", msg),
            BackupError::Parse(msg) => write!(f, "backup parse failed: {}", msg),
            BackupError::Store(e) => write!(f, "backup upload failed: {}", e),
        }
    }
}

impl std::error::Error for BackupError {}

/// Serialize `metrics` under `dimensions` and put the document at its derived
/// path. Returns the path written.
pub async fn upload_document(
    store: &dyn ObjectStore,
    dimensions: &Dimensions,
    metrics: &[Metric],
) -> Result<String, BackupError> {
    let path = backup_path(dimensions, Utc::now(), ticks());
    let body = BackupDocument::new(dimensions, metrics).to_json_pretty()?;
    store
        .put_object(&path, Bytes::from(body))
        .await
        .map_err(BackupError::Store)?;
    Ok(path)
}

fn ticks() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{MetricName, MetricUnit, TransferType};
    use crate::transport::MemoryObjectStore;

    #[tokio::test]
    async fn upload_writes_document_under_tool_platform_instance() {
        let store = MemoryObjectStore::new();
        let dims = Dimensions {
            platform_name: "linux".to_string(),
            tool_name: "bench".to_string(),
            instance_type: "c5".to_string(),
            transfer_type: TransferType::SinglePart,
            encrypted: false,
            replay_id: None,
        };
        let metrics = vec![Metric::with_timestamp(MetricName::BytesUp, MetricUnit::Bytes, 1_000, 4.0)];

        let path = upload_document(&store, &dims, &metrics).await.unwrap();
        assert!(path.starts_with("bench/linux/c5/"));
        assert!(path.ends_with(".json"));
        assert!(!path.contains(':'));

        let body = store.get_object(&path).await.unwrap();
        let doc = BackupDocument::parse(&body).unwrap();
        assert_eq!(doc.to_metrics().unwrap(), metrics);
    }
}
