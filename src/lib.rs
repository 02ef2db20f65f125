// src/lib.rs
pub use bytes::Bytes;

pub mod aggregator;
pub mod backup;
pub mod cli;
pub mod config;
pub mod dimensions;
pub mod logging;
pub mod metric;
pub mod poller;
pub mod publisher;
pub mod transport;

// Re-export tracing for use in other modules
pub use tracing;

pub use aggregator::{AggregationStore, DrainCoordinator};
pub use backup::{BackupDocument, BackupError, BackupLog, ReplayError, ReplaySummary};
pub use config::PublisherConfig;
pub use dimensions::{DimensionSource, Dimensions, ReplayContext};
pub use metric::{Metric, MetricName, MetricUnit, TransferType, TransportMetricName};
pub use publisher::{MetricsPublisher, PublishError, TickOutcome};
pub use transport::{
    Connection, ConnectionPool, ObjectStore, PublishRequest, RequestSigner, TransportError,
    TransportStats, TransportStatsSource,
};
