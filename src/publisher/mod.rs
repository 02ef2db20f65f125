//! The publisher facade that producers and orchestration code talk to.

mod batch;
mod payload;
mod scheduler;

pub use batch::{BatchPublisher, PreparedBatch, PublishError, PublishPipeline};
pub use payload::{build_request, encode_put_metric_data, endpoint_host, iso8601};
pub use scheduler::{InFlight, PublishScheduler, TickOutcome};

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::aggregator::{AggregationStore, DrainCoordinator};
use crate::backup::{
    dashboard_link, load_replay, upload_document, BackupLog, LoadedReplay, ReplayError,
    ReplaySummary,
};
use crate::config::PublisherConfig;
use crate::dimensions::DimensionSource;
use crate::metric::{Metric, MetricName, MetricUnit, TransferType};
use crate::poller::{spawn_transport_poller, TransferDirection};
use crate::transport::{ConnectionPool, ObjectStore, RequestSigner, TransportStatsSource};

/// Aggregates samples, publishes them on a fixed cadence, keeps a backup of
/// every batch and replays earlier backups.
///
/// Must be created inside a tokio runtime: construction spawns the scheduler.
pub struct MetricsPublisher {
    config: PublisherConfig,
    store: Arc<AggregationStore>,
    drain: Arc<DrainCoordinator>,
    dimensions: Arc<DimensionSource>,
    backup: Arc<Mutex<BackupLog>>,
    backup_store: Arc<dyn ObjectStore>,
    trigger: Arc<Notify>,
    in_flight: InFlight,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
    pollers: Mutex<Vec<JoinHandle<()>>>,
}

impl MetricsPublisher {
    pub fn start(
        config: PublisherConfig,
        signer: Arc<dyn RequestSigner>,
        pool: Arc<dyn ConnectionPool>,
        backup_store: Arc<dyn ObjectStore>,
    ) -> Self {
        let store = Arc::new(AggregationStore::new());
        let drain = Arc::new(DrainCoordinator::new());
        let dimensions = Arc::new(DimensionSource::from_config(&config));
        let backup = Arc::new(Mutex::new(BackupLog::new()));
        let trigger = Arc::new(Notify::new());
        let in_flight = InFlight::default();

        let endpoint = config.monitoring_endpoint();
        let batch = BatchPublisher::new(
            config.namespace.clone(),
            endpoint_host(&endpoint),
            config.batch_size(),
            backup.clone(),
            PublishPipeline::new(signer, pool),
        );
        let scheduler = PublishScheduler::new(
            config.publish_interval(),
            store.clone(),
            drain.clone(),
            dimensions.clone(),
            batch,
            in_flight.clone(),
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(scheduler.run(trigger.clone(), shutdown_rx));

        info!(
            namespace = %config.namespace,
            endpoint = %endpoint,
            interval_ms = config.publish_interval_ms,
            "metrics publisher started"
        );

        Self {
            config,
            store,
            drain,
            dimensions,
            backup,
            backup_store,
            trigger,
            in_flight,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            scheduler: Mutex::new(Some(handle)),
            pollers: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    pub fn add_sample(&self, metric: Metric) {
        self.store.add_sample(metric);
    }

    pub fn add_samples(&self, metrics: impl IntoIterator<Item = Metric>) {
        self.store.add_samples(metrics);
    }

    /// Count one finished transfer as a success or failure, stamped now.
    pub fn add_transfer_status(&self, success: bool) {
        self.add_transfer_status_at(crate::metric::current_time_ms(), success);
    }

    pub fn add_transfer_status_at(&self, timestamp: u64, success: bool) {
        let name = if success {
            MetricName::SuccessfulTransfer
        } else {
            MetricName::FailedTransfer
        };
        self.store
            .add_sample(Metric::with_timestamp(name, MetricUnit::Count, timestamp, 1.0));
    }

    pub fn set_transfer_type(&self, transfer_type: TransferType) {
        self.dimensions.set_transfer_type(transfer_type);
    }

    /// Record a pool's gauges every `poll_interval_ms` until shutdown.
    pub fn poll_transport(&self, source: Arc<dyn TransportStatsSource>, direction: TransferDirection) {
        let handle = spawn_transport_poller(
            source,
            direction,
            self.store.clone(),
            self.config.poll_interval(),
        );
        self.pollers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }

    /// Force a publish cycle and wait until the store has been fully drained.
    pub async fn flush(&self) {
        self.trigger.notify_one();
        self.drain.wait_for_drain().await;
    }

    pub async fn wait_for_drain(&self) {
        self.drain.wait_for_drain().await;
    }

    /// Wait for every batch handed to the network so far to finish.
    pub async fn wait_for_last_publish(&self) {
        self.in_flight.wait_all().await;
    }

    /// Upload the live session's backup. Returns the object path, or `None`
    /// in fork mode or when the upload fails.
    pub async fn upload_backup(&self, print_path: bool) -> Option<String> {
        if self.config.fork_mode {
            warn!("backup upload is not supported in fork mode");
            return None;
        }

        let metrics: Vec<Metric> = self.backup_log().session().metrics().cloned().collect();
        let dimensions = self.dimensions.live();
        info!(metrics = metrics.len(), "uploading backup");

        match upload_document(self.backup_store.as_ref(), &dimensions, &metrics).await {
            Ok(path) => {
                info!(path = %path, "uploading backup finished");
                if print_path {
                    println!("Path of back up is: {}", path);
                }
                Some(path)
            }
            Err(e) => {
                error!(error = %e, "failed to upload backup");
                None
            }
        }
    }

    /// Replay the backup at `path` under a fresh replay id, wait for it to
    /// drain and print a dashboard link comparing it to the recorded run.
    ///
    /// Replays must not run concurrently with each other. The replay tags are
    /// installed as a publisher-wide overlay for the duration of the call, so
    /// live samples snapshotted in that window are tagged and recorded as
    /// replay data too. Pause live producers around a replay to keep the two
    /// apart.
    pub async fn rehydrate_backup(&self, path: &str) -> Result<ReplaySummary, ReplayError> {
        let LoadedReplay { context, metrics } = load_replay(
            self.backup_store.as_ref(),
            path,
            self.config.relocate_replay_timestamps,
        )
        .await?;

        let replay_id = context.replay_id;
        let metric_count = metrics.len();
        let link = dashboard_link(&self.config.region, &self.config.namespace, &context);

        {
            let _overlay = self.dimensions.install_overlay(context);
            self.store.add_samples(metrics);
            self.flush().await;
            println!("{}", link);
        }

        info!(replay_id, metric_count, path = %path, "replay published");
        Ok(ReplaySummary {
            replay_id,
            metric_count,
            dashboard_link: link,
        })
    }

    /// Stop the scheduler and pollers, then wait for in-flight publishes.
    /// Samples still queued are not sent; call [`flush`](Self::flush) first.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = tx.send(());
        }
        let handle = self.scheduler.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "publish scheduler ended abnormally");
            }
        }

        for poller in self.pollers.lock().unwrap_or_else(|e| e.into_inner()).drain(..) {
            poller.abort();
        }

        self.in_flight.wait_all().await;
        info!("metrics publisher stopped");
    }

    pub fn store(&self) -> &AggregationStore {
        &self.store
    }

    pub fn dimensions(&self) -> &DimensionSource {
        &self.dimensions
    }

    pub fn backup_log(&self) -> MutexGuard<'_, BackupLog> {
        self.backup.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for MetricsPublisher {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.get_mut().ok().and_then(Option::take) {
            let _ = tx.send(());
        }
        if let Ok(pollers) = self.pollers.get_mut() {
            pollers.drain(..).for_each(|p| p.abort());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Connection, MemoryObjectStore, PublishRequest, TransportError};
    use std::time::Duration;

    struct PassSigner;

    #[async_trait::async_trait]
    impl RequestSigner for PassSigner {
        async fn sign(&self, request: PublishRequest) -> Result<PublishRequest, TransportError> {
            Ok(request)
        }
    }

    struct OkPool;
    struct OkConnection;

    #[async_trait::async_trait]
    impl Connection for OkConnection {
        async fn send(&mut self, _request: &PublishRequest) -> Result<u16, TransportError> {
            Ok(200)
        }
    }

    #[async_trait::async_trait]
    impl ConnectionPool for OkPool {
        async fn acquire(&self) -> Result<Box<dyn Connection>, TransportError> {
            Ok(Box::new(OkConnection))
        }
    }

    fn publisher(config: PublisherConfig) -> MetricsPublisher {
        MetricsPublisher::start(
            config,
            Arc::new(PassSigner),
            Arc::new(OkPool),
            Arc::new(MemoryObjectStore::new()),
        )
    }

    fn fast_config() -> PublisherConfig {
        PublisherConfig {
            publish_interval_ms: 5,
            ..PublisherConfig::default()
        }
    }

    #[tokio::test]
    async fn transfer_status_counts_accumulate_per_second() {
        let publisher = publisher(PublisherConfig {
            publish_interval_ms: 60_000,
            ..PublisherConfig::default()
        });
        publisher.add_transfer_status_at(10_100, true);
        publisher.add_transfer_status_at(10_900, true);
        publisher.add_transfer_status_at(10_500, false);

        let snapshot = publisher.store().take_snapshot_and_clear();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].name, MetricName::SuccessfulTransfer);
        assert_eq!(snapshot[0].value, 2.0);
        assert_eq!(snapshot[1].value, 1.0);
        publisher.shutdown().await;
    }

    #[tokio::test]
    async fn flush_on_empty_store_returns() {
        let publisher = publisher(fast_config());
        tokio::time::timeout(Duration::from_secs(5), publisher.flush())
            .await
            .expect("flush on an empty store should return");
        publisher.shutdown().await;
    }

    #[tokio::test]
    async fn fork_mode_skips_upload() {
        let publisher = publisher(PublisherConfig {
            fork_mode: true,
            ..fast_config()
        });
        assert_eq!(publisher.upload_backup(false).await, None);
        publisher.shutdown().await;
    }

    #[tokio::test]
    async fn flushed_batches_are_tagged_with_current_transfer_type() {
        let publisher = publisher(fast_config());
        publisher.set_transfer_type(TransferType::MultiPart);
        publisher.add_sample(Metric::new(MetricName::BytesUp, MetricUnit::Bytes, 10.0));
        publisher.flush().await;
        publisher.wait_for_last_publish().await;

        {
            let log = publisher.backup_log();
            assert_eq!(log.session().len(), 1);
        }
        assert!(publisher.store().is_empty());
        assert_eq!(publisher.dimensions().resolve().transfer_type, TransferType::MultiPart);
        publisher.shutdown().await;
    }
}
