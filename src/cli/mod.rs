pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "transfer-metrics")]
#[command(about = "Aggregate, publish, back up and replay transfer benchmark metrics")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Args)]
pub struct GlobalArgs {
    /// Config file (defaults to ./transfer-metrics.toml, then the user config dir)
    #[arg(long, global = true, env = "TRANSFER_METRICS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Directory used as the backup object store
    #[arg(long, global = true, env = "TRANSFER_METRICS_BACKUP_DIR", conflicts_with = "backup_url")]
    pub backup_dir: Option<PathBuf>,

    /// Base URL of an HTTP object store holding backups
    #[arg(long, global = true, env = "TRANSFER_METRICS_BACKUP_URL")]
    pub backup_url: Option<String>,

    /// Metrics service endpoint (overrides the config file)
    #[arg(long, global = true, env = "TRANSFER_METRICS_ENDPOINT")]
    pub endpoint: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run synthetic producers and publish what they record
    Drive(DriveArgs),
    /// Replay a stored backup under a fresh replay id
    Replay(ReplayArgs),
}

#[derive(clap::Args)]
pub struct DriveArgs {
    /// Number of concurrent producers
    #[arg(long, default_value_t = 4)]
    pub producers: usize,

    /// How long each producer runs, in seconds
    #[arg(long, default_value_t = 5)]
    pub seconds: u64,

    /// Upload the session backup when done and print its path
    #[arg(long)]
    pub upload_backup: bool,
}

#[derive(clap::Args)]
pub struct ReplayArgs {
    /// Object path of the backup, as printed by `drive --upload-backup`
    pub path: String,

    /// Shift replayed timestamps so the earliest one lands at now
    #[arg(long)]
    pub relocate: bool,
}
