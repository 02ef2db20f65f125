mod drive;
mod replay;

pub use drive::execute_drive;
pub use replay::execute_replay;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::GlobalArgs;
use crate::config::{load_config_from_path, PublisherConfig, CONFIG_FILENAME};
use crate::transport::{HttpObjectStore, LocalObjectStore, ObjectStore};

/// Config from `--config` if given, otherwise the default search path, with
/// CLI overrides applied on top.
pub fn resolve_config(global: &GlobalArgs) -> Result<PublisherConfig> {
    let mut config = match &global.config {
        Some(path) => load_config_from_path(path)?,
        None => PublisherConfig::load()
            .with_context(|| format!("Failed to load {}", CONFIG_FILENAME))?,
    };
    if let Some(endpoint) = &global.endpoint {
        config.endpoint = Some(endpoint.clone());
    }
    Ok(config)
}

/// Backup store chosen by the global flags. Defaults to a directory under the
/// user's local data dir.
pub fn backup_store(global: &GlobalArgs, config: &PublisherConfig) -> Result<Arc<dyn ObjectStore>> {
    if let Some(url) = &global.backup_url {
        let store = HttpObjectStore::new(url.clone(), config.backup_bucket.clone())
            .map_err(anyhow::Error::msg)?;
        return Ok(Arc::new(store));
    }

    let dir = match &global.backup_dir {
        Some(dir) => dir.clone(),
        None => dirs::data_local_dir()
            .map(|d| d.join("transfer-metrics"))
            .unwrap_or_else(|| PathBuf::from(".transfer-metrics"))
            .join(&config.backup_bucket),
    };
    Ok(Arc::new(LocalObjectStore::new(dir)))
}
