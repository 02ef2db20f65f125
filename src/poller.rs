//! Periodic sampling of connection-pool gauges into the aggregation store.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::aggregator::AggregationStore;
use crate::metric::{current_time_ms, Metric, MetricName, MetricUnit, TransportMetricName};
use crate::transport::{TransportStats, TransportStatsSource};

/// Which side of the transfer a pool serves. Picks the metric name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Upload,
    Download,
}

impl TransferDirection {
    pub fn metric_name(self, gauge: TransportMetricName) -> MetricName {
        match self {
            TransferDirection::Upload => MetricName::Upload(gauge),
            TransferDirection::Download => MetricName::Download(gauge),
        }
    }
}

/// One Count sample per gauge, all stamped with `timestamp`.
pub fn transport_samples(stats: TransportStats, direction: TransferDirection, timestamp: u64) -> Vec<Metric> {
    TransportMetricName::all()
        .iter()
        .map(|&gauge| {
            let value = match gauge {
                TransportMetricName::HeldConnectionCount => stats.held_connections,
                TransportMetricName::PendingAcquisitionCount => stats.pending_acquisitions,
                TransportMetricName::PendingConnectsCount => stats.pending_connects,
                TransportMetricName::VendedConnectionCount => stats.vended_connections,
                TransportMetricName::OpenConnectionCount => stats.open_connections,
            };
            Metric::with_timestamp(direction.metric_name(gauge), MetricUnit::Count, timestamp, value as f64)
        })
        .collect()
}

/// Sample `source` every `interval` until the returned handle is aborted.
pub fn spawn_transport_poller(
    source: Arc<dyn TransportStatsSource>,
    direction: TransferDirection,
    store: Arc<AggregationStore>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let stats = source.transport_stats();
            debug!(?direction, ?stats, "transport stats sampled");
            store.add_samples(transport_samples(stats, direction, current_time_ms()));
        }
    })
}
