use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::{backup_store, resolve_config};
use crate::cli::{DriveArgs, GlobalArgs};
use crate::metric::{Metric, MetricName, MetricUnit};
use crate::poller::TransferDirection;
use crate::publisher::MetricsPublisher;
use crate::transport::{DateStampSigner, HttpConnectionPool};

const PRODUCER_STEP: Duration = Duration::from_millis(100);

pub async fn execute_drive(global: &GlobalArgs, args: DriveArgs) -> Result<()> {
    let config = resolve_config(global)?;
    let store = backup_store(global, &config)?;
    let pool = Arc::new(
        HttpConnectionPool::new(config.monitoring_endpoint(), config.max_connections)
            .map_err(anyhow::Error::msg)?,
    );

    println!(
        "==> Driving {} producers for {}s against {}",
        args.producers,
        args.seconds,
        pool.endpoint()
    );

    let publisher = Arc::new(MetricsPublisher::start(
        config,
        Arc::new(DateStampSigner),
        pool.clone(),
        store,
    ));
    publisher.poll_transport(pool, TransferDirection::Upload);

    let producers: Vec<_> = (0..args.producers)
        .map(|id| tokio::spawn(run_producer(publisher.clone(), id, args.seconds)))
        .collect();
    for producer in futures::future::join_all(producers).await {
        producer?;
    }

    publisher.flush().await;
    publisher.wait_for_last_publish().await;
    info!(
        published = publisher.backup_log().session().len(),
        "producers finished"
    );

    if args.upload_backup {
        if publisher.upload_backup(true).await.is_none() {
            println!("    Backup was not uploaded (see log)");
        }
    }

    publisher.shutdown().await;
    Ok(())
}

/// Record a deterministic stream of transfer samples for `seconds`.
async fn run_producer(publisher: Arc<MetricsPublisher>, id: usize, seconds: u64) {
    let steps = seconds * 1000 / PRODUCER_STEP.as_millis() as u64;
    let mut ticker = tokio::time::interval(PRODUCER_STEP);

    for step in 0..steps {
        ticker.tick().await;
        let bytes = ((id as u64 + 1) * 1024 * 1024 + step * 4096) as f64;
        publisher.add_samples([
            Metric::new(MetricName::BytesUp, MetricUnit::Bytes, bytes),
            Metric::new(MetricName::BytesDown, MetricUnit::Bytes, bytes / 2.0),
            Metric::new(MetricName::NumConnections, MetricUnit::Count, 1.0),
        ]);
        // every tenth step fails, to exercise both status counters
        publisher.add_transfer_status(step % 10 != 9);
    }
}
