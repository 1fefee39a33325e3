// Server RPC - JSON-RPC HTTP Server using warp
//
// The backend only reads the transaction index, so handlers call it directly
// instead of going through the node's event loop.

use crate::rpc::methods::RpcMethods;
use crate::rpc::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::sync::oneshot;
use tracing::{debug, info};
use warp::Filter;

// =============================================================================
// RPC SERVER
// =============================================================================

/// JSON-RPC HTTP Server
pub struct RpcServer {
    /// Listen address
    addr: SocketAddr,
    /// Allowed CORS origins (empty = localhost only)
    allowed_origins: Vec<String>,
    /// Max request body size in bytes
    max_request_size: u64,
}

impl RpcServer {
    pub fn new(config: &RpcConfig) -> Self {
        Self {
            addr: config.socket_addr(),
            allowed_origins: config.cors_origins.clone(),
            max_request_size: config.max_request_size,
        }
    }

    /// Build CORS filter: only allows specified origins, or localhost if none
    fn build_cors_filter(&self) -> warp::cors::Builder {
        let mut cors = warp::cors()
            .allow_methods(vec!["GET", "POST", "OPTIONS"])
            .allow_headers(vec!["Content-Type", "Accept"]);

        if self.allowed_origins.is_empty() {
            cors = cors
                .allow_origin("http://localhost")
                .allow_origin("http://127.0.0.1");
            info!("CORS: Restricted to localhost only");
        } else {
            for origin in &self.allowed_origins {
                cors = cors.allow_origin(origin.as_str());
            }
            info!("CORS: Allowed origins: {:?}", self.allowed_origins);
        }

        cors
    }

    /// Start the server in background, returns shutdown handle
    pub fn start_background(self, methods: RpcMethods) -> Result<RpcServerHandle, RpcServerError> {
        info!("Starting RPC server on {}", self.addr);

        let cors = self.build_cors_filter();

        // JSON-RPC endpoint
        let rpc = warp::path::end()
            .and(warp::post())
            .and(warp::addr::remote())
            .and(warp::body::content_length_limit(self.max_request_size))
            .and(warp::body::json())
            .and(with_methods(methods.clone()))
            .and_then(handle_rpc_request);

        // Health check endpoint
        let health = warp::path("health")
            .and(warp::get())
            .and(with_methods(methods))
            .and_then(handle_health_check);

        let routes = rpc.or(health).with(cors).with(warp::log("rpc"));

        let (tx, rx) = oneshot::channel::<()>();

        let (bound_addr, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(self.addr, async {
                rx.await.ok();
            })
            .map_err(|e| RpcServerError::BindError(format!("{}: {}", self.addr, e)))?;

        info!("RPC server ready on http://{}", bound_addr);

        tokio::spawn(server);

        Ok(RpcServerHandle {
            addr: bound_addr,
            shutdown_tx: Some(tx),
        })
    }
}

/// Handle for a running RPC server
pub struct RpcServerHandle {
    /// Server address
    pub addr: SocketAddr,
    /// Shutdown signal sender
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl RpcServerHandle {
    /// Shutdown the server
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Get the server address
    pub fn address(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for RpcServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

// =============================================================================
// REQUEST HANDLERS
// =============================================================================

/// Filter to inject the method handler
fn with_methods(
    methods: RpcMethods,
) -> impl Filter<Extract = (RpcMethods,), Error = Infallible> + Clone {
    warp::any().map(move || methods.clone())
}

async fn handle_rpc_request(
    remote_addr: Option<SocketAddr>,
    request: JsonRpcRequest,
    methods: RpcMethods,
) -> Result<impl warp::Reply, Infallible> {
    let client_ip = remote_addr
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    debug!("RPC request from {}: {}", client_ip, request.method);

    let response = methods.handle_request(request).await;
    Ok(warp::reply::json(&response))
}

async fn handle_health_check(methods: RpcMethods) -> Result<impl warp::Reply, Infallible> {
    let request = JsonRpcRequest::new("eth_blockNumber", serde_json::Value::Null, 0);
    let response = methods.handle_request(request).await;

    let body = match (response.result, response.error) {
        (Some(block_number), None) => serde_json::json!({
            "status": "ok",
            "blockNumber": block_number,
        }),
        (_, error) => serde_json::json!({
            "status": "degraded",
            "error": error.unwrap_or_else(|| JsonRpcError::internal_error("no result")).message,
        }),
    };
    Ok(warp::reply::json(&body))
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RpcServerError {
    #[error("Bind error: {0}")]
    BindError(String),
}

// =============================================================================
// RPC CONFIG
// =============================================================================

/// JSON-RPC settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Enable RPC server
    pub enabled: bool,
    /// Listen address (0.0.0.0 for all interfaces)
    pub address: IpAddr,
    /// Listen port
    pub port: u16,
    /// Allowed CORS origins (empty = localhost only)
    pub cors_origins: Vec<String>,
    /// Max request size in bytes
    pub max_request_size: u64,
    /// Height from which reverted transactions report their real gas used.
    /// Below it, gas used is reported as gas price times gas limit.
    pub fix_revert_gas_refund_height: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8545,
            cors_origins: vec![],
            max_request_size: 10 * 1024 * 1024, // 10 MB
            fix_revert_gas_refund_height: 0,
        }
    }
}

impl RpcConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::backend::Backend;
    use crate::rpc::filters::FilterManager;
    use crate::storage::indexer::test_utils::*;
    use crate::storage::KvIndexer;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn start(cutover: u64) -> (TempDir, KvIndexer, RpcServerHandle) {
        let temp_dir = TempDir::new().unwrap();
        let indexer = KvIndexer::open(temp_dir.path()).unwrap();
        let backend = Backend::new(Arc::new(indexer.clone()), Arc::new(cutover), 9000);

        let config = RpcConfig {
            port: 0,
            ..Default::default()
        };
        let handle = RpcServer::new(&config)
            .start_background(RpcMethods::new(Arc::new(backend), FilterManager::default()))
            .unwrap();
        (temp_dir, indexer, handle)
    }

    #[tokio::test]
    async fn test_receipt_over_http() {
        let (_dir, indexer, handle) = start(2).await;
        let txs = vec![legacy_tx(1, 0, true, 53026, 200_000, 5_000_000_000_000)];
        indexer.index_block(&block_for(1, &txs), &txs).unwrap();

        let url = format!("http://{}/", handle.address());
        let request = JsonRpcRequest::new(
            "eth_getTransactionReceipt",
            serde_json::json!([tx_hash(1, 0).to_hex()]),
            7,
        );
        let response: JsonRpcResponse = reqwest::Client::new()
            .post(&url)
            .json(&request)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let receipt = response.result.unwrap();
        assert_eq!(receipt["gasUsed"], "0xde0b6b3a7640000");
        assert_eq!(response.id, crate::rpc::types::JsonRpcId::Number(7));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (_dir, indexer, handle) = start(0).await;
        indexer.index_block(&block_for(3, &[]), &[]).unwrap();

        let url = format!("http://{}/health", handle.address());
        let body: serde_json::Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["blockNumber"], "0x3");
    }

    #[test]
    fn test_config_from_json_defaults() {
        let config: RpcConfig =
            serde_json::from_str(r#"{"fix_revert_gas_refund_height": 1200, "port": 9545}"#).unwrap();
        assert_eq!(config.fix_revert_gas_refund_height, 1200);
        assert_eq!(config.port, 9545);
        assert_eq!(config.address, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(config.enabled);
    }
}
