// KratOs EVM RPC - Entry point
// Principle: What was served once is served the same way forever

mod cli;
mod execution;
mod rpc;
mod storage;
mod types;

#[cfg(test)]
mod tests;

use clap::Parser;
use cli::config::NodeConfig;
use cli::runner::{query_receipt, run_import, run_node};
use cli::{Cli, Commands};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_filter = if cli.verbose {
        "debug"
    } else {
        cli.log_level.as_str()
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_filter)),
        )
        .init();

    match cli.command {
        Commands::Run(cmd) => {
            // Configuration problems stop the node before it serves anything
            let config = NodeConfig::from_run_cmd(&cmd).map_err(|e| {
                error!("Configuration error: {}", e);
                anyhow::anyhow!("Configuration error: {}", e)
            })?;

            if let Err(e) = run_node(config).await {
                error!("Node error: {}", e);
                return Err(anyhow::anyhow!("Node error: {}", e));
            }
        }

        Commands::Import(cmd) => {
            let stats = run_import(&cmd)?;
            println!(
                "Imported {} blocks, {} transactions ({} blocks already indexed)",
                stats.blocks, stats.transactions, stats.skipped
            );
        }

        Commands::Receipt(cmd) => {
            info!("Querying receipt {} at {}", cmd.hash, cmd.rpc);
            match query_receipt(&cmd).await? {
                Some(receipt) => println!("{}", serde_json::to_string_pretty(&receipt)?),
                None => println!("null"),
            }
        }
    }

    Ok(())
}
