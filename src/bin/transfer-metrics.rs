use clap::Parser;
use transfer_metrics::cli::{commands, Cli, Commands};
use transfer_metrics::logging::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.json);

    match cli.command {
        Commands::Drive(args) => commands::execute_drive(&cli.global, args).await?,
        Commands::Replay(args) => commands::execute_replay(&cli.global, args).await?,
    }

    Ok(())
}
