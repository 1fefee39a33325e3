// Runner - Main node execution logic
// Principle: Orchestrate index, RPC server, reloads, and graceful shutdown

use crate::cli::config::NodeConfig;
use crate::cli::{base_path_or_default, ImportCmd, ReceiptCmd};
use crate::execution::{CutoverHeight, GasAccountingConfig};
use crate::rpc::{
    Backend, FilterManager, JsonRpcRequest, JsonRpcResponse, RpcMethods, RpcServer,
    RpcTransactionReceipt,
};
use crate::storage::{import_blocks, ImportStats, KvIndexer, TxResultStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// How often expired polling filters are dropped
const FILTER_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Run the RPC node with the given configuration
pub async fn run_node(config: NodeConfig) -> Result<(), RunnerError> {
    info!("🚀 Starting KratOs EVM RPC (chain id {})", config.chain_id);
    info!("📁 Index path: {}", config.base_path.display());

    std::fs::create_dir_all(&config.base_path)
        .map_err(|e| RunnerError::Io(format!("Failed to create data dir: {}", e)))?;

    let indexer = KvIndexer::open(&config.base_path)
        .map_err(|e| RunnerError::Storage(e.to_string()))?;
    match indexer.last_indexed_block() {
        Ok(Some(n)) => info!("📦 Indexed up to block {}", n),
        Ok(None) => warn!("⚠️  Transaction index is empty"),
        Err(e) => return Err(RunnerError::Storage(e.to_string())),
    }

    let gas_config = GasAccountingConfig::new(config.rpc.fix_revert_gas_refund_height);
    info!(
        "⛽ Reverted transactions report real gas used from height {}",
        gas_config.fix_revert_gas_refund_height()
    );

    let backend = Arc::new(Backend::new(
        Arc::new(indexer),
        Arc::new(gas_config.clone()),
        config.chain_id,
    ));

    let filters = FilterManager::default();
    let cleanup_task = {
        let filters = filters.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(FILTER_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                filters.cleanup().await;
            }
        })
    };

    let rpc_handle = if config.rpc.enabled {
        let handle = RpcServer::new(&config.rpc)
            .start_background(RpcMethods::new(backend, filters))
            .map_err(|e| RunnerError::Rpc(e.to_string()))?;
        info!("🌐 RPC server: http://{}", handle.address());
        Some(handle)
    } else {
        warn!("RPC server disabled");
        None
    };

    let result = wait_for_shutdown(&config, &gas_config).await;

    info!("🛑 Shutting down...");
    cleanup_task.abort();
    if let Some(handle) = rpc_handle {
        handle.shutdown();
        info!("   RPC server stopped");
    }
    info!("👋 Node stopped cleanly");

    result
}

/// Block until Ctrl-C. On unix, SIGHUP reloads the fix height.
async fn wait_for_shutdown(
    config: &NodeConfig,
    gas_config: &GasAccountingConfig,
) -> Result<(), RunnerError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = signal(SignalKind::hangup())
            .map_err(|e| RunnerError::Io(format!("Failed to install SIGHUP handler: {}", e)))?;

        loop {
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    return res.map_err(|e| RunnerError::Io(e.to_string()));
                }
                _ = hangup.recv() => {
                    reload_gas_config(config, gas_config);
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (config, gas_config);
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| RunnerError::Io(e.to_string()))
    }
}

/// Apply a new fix height. A bad file keeps the current value.
pub fn reload_gas_config(config: &NodeConfig, gas_config: &GasAccountingConfig) {
    match config.reload_fix_revert_gas_refund_height() {
        Ok(height) => {
            let previous = gas_config.fix_revert_gas_refund_height();
            gas_config.set_fix_revert_gas_refund_height(height);
            if previous != height {
                info!("🔄 Fix revert gas refund height: {} -> {}", previous, height);
            }
        }
        Err(e) => error!("Config reload failed, keeping current settings: {}", e),
    }
}

/// Import exported blocks into the index
pub fn run_import(cmd: &ImportCmd) -> Result<ImportStats, RunnerError> {
    let base_path = base_path_or_default(cmd.base_path.as_ref());
    std::fs::create_dir_all(&base_path)
        .map_err(|e| RunnerError::Io(format!("Failed to create data dir: {}", e)))?;

    let indexer = KvIndexer::open(&base_path).map_err(|e| RunnerError::Storage(e.to_string()))?;
    import_blocks(&indexer, &cmd.file).map_err(|e| RunnerError::Storage(e.to_string()))
}

/// Fetch a receipt from a running node. `Ok(None)` if the node does not know the tx.
pub async fn query_receipt(cmd: &ReceiptCmd) -> Result<Option<RpcTransactionReceipt>, RunnerError> {
    let request = JsonRpcRequest::new(
        "eth_getTransactionReceipt",
        serde_json::json!([cmd.hash]),
        1,
    );

    let response: JsonRpcResponse = reqwest::Client::new()
        .post(&cmd.rpc)
        .json(&request)
        .send()
        .await
        .map_err(|e| RunnerError::Rpc(format!("Request to {} failed: {}", cmd.rpc, e)))?
        .json()
        .await
        .map_err(|e| RunnerError::Rpc(format!("Invalid response: {}", e)))?;

    if let Some(err) = response.error {
        return Err(RunnerError::Rpc(format!("{} ({})", err.message, err.code)));
    }

    match response.result {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| RunnerError::Rpc(format!("Invalid receipt: {}", e))),
    }
}

/// Runner errors
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("IO error: {0}")]
    Io(String),
}
