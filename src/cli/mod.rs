// CLI - Command Line Interface for the KratOs EVM RPC node
// Principle: Simple, clear, composable commands

pub mod config;
pub mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// KratOs EVM RPC - Ethereum JSON-RPC over the KratOs transaction index
#[derive(Parser, Debug)]
#[command(name = "kratos-evm-rpc")]
#[command(author = "KratOs Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ethereum JSON-RPC backend serving deterministic receipts")]
#[command(long_about = r#"
Serves Ethereum JSON-RPC receipts and transactions from the KratOs
transaction index.

Reverted transactions executed below --fix-revert-gas-refund-height keep
reporting gas price times gas limit as their gas used, as they always did.

Serve the index:
  kratos-evm-rpc run --fix-revert-gas-refund-height 1200000

Load blocks exported by the ledger:
  kratos-evm-rpc import blocks.json

Query a running node:
  kratos-evm-rpc receipt 0x<tx hash>
"#)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true, default_value = "false")]
    pub verbose: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", env = "KRATOS_LOG")]
    pub log_level: String,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the JSON-RPC API
    Run(RunCmd),

    /// Import exported blocks into the index
    Import(ImportCmd),

    /// Fetch a transaction receipt from a running node
    Receipt(ReceiptCmd),
}

/// Serve the JSON-RPC API
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Base path for the transaction index
    #[arg(short = 'd', long, env = "KRATOS_BASE_PATH")]
    pub base_path: Option<PathBuf>,

    /// JSON configuration file (reloaded on SIGHUP)
    #[arg(short, long, env = "KRATOS_CONFIG")]
    pub config: Option<PathBuf>,

    /// EVM chain id
    #[arg(long, env = "KRATOS_CHAIN_ID")]
    pub chain_id: Option<u64>,

    /// RPC listen port
    #[arg(long, env = "KRATOS_RPC_PORT")]
    pub rpc_port: Option<u16>,

    /// RPC listen address (use 0.0.0.0 for public)
    #[arg(long)]
    pub rpc_addr: Option<String>,

    /// Allowed CORS origin (can be specified multiple times)
    #[arg(long = "rpc-cors", value_name = "ORIGIN")]
    pub rpc_cors: Vec<String>,

    /// Height from which reverted transactions report their real gas used
    #[arg(long, env = "KRATOS_FIX_REVERT_GAS_REFUND_HEIGHT")]
    pub fix_revert_gas_refund_height: Option<u64>,
}

/// Import exported blocks
#[derive(Parser, Debug)]
pub struct ImportCmd {
    /// Base path for the transaction index
    #[arg(short = 'd', long, env = "KRATOS_BASE_PATH")]
    pub base_path: Option<PathBuf>,

    /// JSON file with an array of exported blocks
    pub file: PathBuf,
}

/// Fetch a receipt
#[derive(Parser, Debug)]
pub struct ReceiptCmd {
    /// Transaction hash
    pub hash: String,

    /// RPC endpoint to query
    #[arg(long, default_value = "http://127.0.0.1:8545")]
    pub rpc: String,
}

/// Default data directory, shared by all commands
pub fn base_path_or_default(base_path: Option<&PathBuf>) -> PathBuf {
    if let Some(path) = base_path {
        path.clone()
    } else {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kratos")
            .join("evm-index")
    }
}
