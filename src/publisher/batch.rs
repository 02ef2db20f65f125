//! Slicing snapshots into bounded batches and driving each through
//! sign, acquire, send.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

use super::payload::{build_request, encode_put_metric_data};
use crate::backup::BackupLog;
use crate::dimensions::Dimensions;
use crate::metric::Metric;
use crate::transport::{ConnectionPool, PublishRequest, RequestSigner, TransportError};

/// Errors from one publish attempt, tagged with the stage that failed.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishError {
    Sign(TransportError),
    Acquire(TransportError),
    Send(TransportError),
    Status(u16),
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishError::Sign(e) => write!(f, "sign stage failed: {}", e),
            PublishError::Acquire(e) => write!(f, "acquire stage failed: {}", e),
            PublishError::Send(e) => write!(f, "send stage failed: {}", e),
            PublishError::Status(status) => write!(f, "metrics service returned HTTP {}", status),
        }
    }
}

impl std::error::Error for PublishError {}

/// One encoded batch, already recorded in the backup log.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub dimensions: Dimensions,
    pub metrics: Vec<Metric>,
    pub request: PublishRequest,
}

/// The network half of publishing. Cheap to clone so each batch can run on
/// its own task.
#[derive(Clone)]
pub struct PublishPipeline {
    signer: Arc<dyn RequestSigner>,
    pool: Arc<dyn ConnectionPool>,
}

impl PublishPipeline {
    pub fn new(signer: Arc<dyn RequestSigner>, pool: Arc<dyn ConnectionPool>) -> Self {
        Self { signer, pool }
    }

    /// Single attempt, no retry. Failures are logged here and returned.
    #[tracing::instrument(
        name = "publish_batch",
        skip(self, batch),
        fields(batch_size = batch.metrics.len(), replay_id = ?batch.dimensions.replay_id)
    )]
    pub async fn publish(&self, batch: PreparedBatch) -> Result<u16, PublishError> {
        let signed = self.signer.sign(batch.request).await.map_err(|e| {
            error!(error = %e, "failed to sign metrics request, dropping batch");
            PublishError::Sign(e)
        })?;

        let mut connection = self.pool.acquire().await.map_err(|e| {
            error!(error = %e, "failed to acquire connection, dropping batch");
            PublishError::Acquire(e)
        })?;

        let status = connection.send(&signed).await.map_err(|e| {
            error!(error = %e, "metrics request failed");
            PublishError::Send(e)
        })?;

        if !(200..300).contains(&status) {
            warn!(status, "metrics service rejected batch");
            return Err(PublishError::Status(status));
        }

        debug!(status, "batch published");
        Ok(status)
    }
}

/// Holds the carry-over from the current snapshot and cuts it into batches.
pub struct BatchPublisher {
    namespace: String,
    host: String,
    max_batch_size: usize,
    backup: Arc<Mutex<BackupLog>>,
    pipeline: PublishPipeline,
    carry_over: VecDeque<Metric>,
    dimensions: Option<Dimensions>,
}

impl BatchPublisher {
    pub fn new(
        namespace: impl Into<String>,
        host: impl Into<String>,
        max_batch_size: usize,
        backup: Arc<Mutex<BackupLog>>,
        pipeline: PublishPipeline,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            host: host.into(),
            max_batch_size: max_batch_size.max(1),
            backup,
            pipeline,
            carry_over: VecDeque::new(),
            dimensions: None,
        }
    }

    /// Take ownership of a snapshot, tagged with the dimensions resolved when
    /// it was taken. Any previous carry-over must already be drained.
    pub fn load(&mut self, snapshot: Vec<Metric>, dimensions: Dimensions) {
        debug_assert!(self.carry_over.is_empty());
        self.carry_over = snapshot.into();
        self.dimensions = Some(dimensions);
    }

    pub fn has_carry_over(&self) -> bool {
        !self.carry_over.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.carry_over.len()
    }

    /// Cut the next batch from the front of the carry-over, encode it, and
    /// record it in the backup log before any network work.
    pub fn next_batch(&mut self) -> Option<PreparedBatch> {
        if self.carry_over.is_empty() {
            return None;
        }
        let dimensions = self.dimensions.clone()?;

        let take = self.max_batch_size.min(self.carry_over.len());
        let metrics: Vec<Metric> = self.carry_over.drain(..take).collect();

        let body = encode_put_metric_data(&self.namespace, &dimensions, &metrics);
        let request = build_request(&self.host, body);

        self.backup
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .append_batch(&dimensions, metrics.clone());

        if self.carry_over.is_empty() {
            self.dimensions = None;
        }

        Some(PreparedBatch {
            dimensions,
            metrics,
            request,
        })
    }

    pub fn pipeline(&self) -> PublishPipeline {
        self.pipeline.clone()
    }

    pub async fn publish(&self, batch: PreparedBatch) -> Result<u16, PublishError> {
        self.pipeline.publish(batch).await
    }
}
