use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::metric::TransferType;

pub const CONFIG_FILENAME: &str = "transfer-metrics.toml";

/// Upper bound on samples per PutMetricData request.
pub const MAX_METRICS_PER_REQUEST: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub namespace: String,
    pub region: String,
    /// Overrides `https://monitoring.{region}.amazonaws.com`.
    pub endpoint: Option<String>,
    pub publish_interval_ms: u64,
    pub max_batch_size: usize,
    pub max_connections: usize,
    pub platform_name: String,
    pub tool_name: String,
    pub instance_type: String,
    pub transfer_type: TransferType,
    pub send_encrypted: bool,
    /// Backups are not coordinated across forked processes.
    pub fork_mode: bool,
    pub backup_bucket: String,
    pub relocate_replay_timestamps: bool,
    pub poll_interval_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            namespace: "transfer-canary".to_string(),
            region: "us-west-2".to_string(),
            endpoint: None,
            publish_interval_ms: 50,
            max_batch_size: MAX_METRICS_PER_REQUEST,
            max_connections: 5,
            platform_name: std::env::consts::OS.to_string(),
            tool_name: "NA".to_string(),
            instance_type: "unknown".to_string(),
            transfer_type: TransferType::None,
            send_encrypted: false,
            fork_mode: false,
            backup_bucket: "transfer-canary-backups".to_string(),
            relocate_replay_timestamps: false,
            poll_interval_ms: 1000,
        }
    }
}

impl PublisherConfig {
    /// Load `transfer-metrics.toml` from the working directory, then from the
    /// user config directory, falling back to defaults when neither exists.
    pub fn load() -> Result<Self> {
        for candidate in config_candidates() {
            if candidate.exists() {
                return load_config_from_path(&candidate);
            }
        }
        Ok(Self::default())
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Batch size clamped to what the remote service accepts.
    pub fn batch_size(&self) -> usize {
        self.max_batch_size.clamp(1, MAX_METRICS_PER_REQUEST)
    }

    pub fn monitoring_endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://monitoring.{}.amazonaws.com", self.region))
    }
}

fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(CONFIG_FILENAME)];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("transfer-metrics").join("config.toml"));
    }
    candidates
}

pub fn load_config_from_path(path: impl AsRef<Path>) -> Result<PublisherConfig> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;
    let config: PublisherConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.as_ref().display()))?;
    Ok(config)
}
