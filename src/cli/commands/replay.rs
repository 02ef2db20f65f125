use anyhow::{Context, Result};
use std::sync::Arc;

use super::{backup_store, resolve_config};
use crate::cli::{GlobalArgs, ReplayArgs};
use crate::publisher::MetricsPublisher;
use crate::transport::{DateStampSigner, HttpConnectionPool};

pub async fn execute_replay(global: &GlobalArgs, args: ReplayArgs) -> Result<()> {
    let mut config = resolve_config(global)?;
    config.relocate_replay_timestamps |= args.relocate;

    let store = backup_store(global, &config)?;
    let pool = HttpConnectionPool::new(config.monitoring_endpoint(), config.max_connections)
        .map_err(anyhow::Error::msg)?;

    println!("==> Replaying backup: {}", args.path);
    let publisher = MetricsPublisher::start(config, Arc::new(DateStampSigner), Arc::new(pool), store);

    let summary = publisher
        .rehydrate_backup(&args.path)
        .await
        .with_context(|| format!("Failed to replay {}", args.path))?;
    publisher.wait_for_last_publish().await;
    publisher.shutdown().await;

    println!("    Replay ID: {}", summary.replay_id);
    println!("    Metrics replayed: {}", summary.metric_count);
    Ok(())
}
