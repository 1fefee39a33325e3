// Methods RPC - Ethereum JSON-RPC method implementations
use crate::rpc::backend::{Backend, BackendError};
use crate::rpc::filters::{check_range, FilterKind, FilterManager, LogFilter};
use crate::rpc::types::*;
use crate::types::{to_quantity, BlockNumber};
use std::sync::Arc;
use tracing::{debug, error};

// =============================================================================
// RPC METHODS
// =============================================================================

/// RPC method handler
#[derive(Clone)]
pub struct RpcMethods {
    backend: Arc<Backend>,
    filters: FilterManager,
}

impl RpcMethods {
    /// Create new RPC methods handler
    pub fn new(backend: Arc<Backend>, filters: FilterManager) -> Self {
        Self { backend, filters }
    }

    /// Handle a JSON-RPC request
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        // Validate JSON-RPC version
        if request.jsonrpc != "2.0" {
            return JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_request("Invalid JSON-RPC version"),
            );
        }

        debug!("RPC request: {}", request.method);

        // Route to appropriate method
        match request.method.as_str() {
            // Eth methods
            "eth_getTransactionReceipt" => self.eth_get_transaction_receipt(request.id, &request.params),
            "eth_getBlockReceipts" => self.eth_get_block_receipts(request.id, &request.params).await,
            "eth_getTransactionByHash" => self.eth_get_transaction_by_hash(request.id, &request.params),
            "eth_getBlockByNumber" => self.eth_get_block_by_number(request.id, &request.params),
            "eth_getBlockByHash" => self.eth_get_block_by_hash(request.id, &request.params),
            "eth_getLogs" => self.eth_get_logs(request.id, &request.params).await,
            "eth_blockNumber" => self.eth_block_number(request.id),
            "eth_chainId" => JsonRpcResponse::success(request.id, to_quantity(self.backend.chain_id())),

            // Filter methods
            "eth_newFilter" => self.eth_new_filter(request.id, &request.params).await,
            "eth_newBlockFilter" => self.eth_new_block_filter(request.id).await,
            "eth_getFilterChanges" => self.eth_get_filter_changes(request.id, &request.params).await,
            "eth_getFilterLogs" => self.eth_get_filter_logs(request.id, &request.params).await,
            "eth_uninstallFilter" => self.eth_uninstall_filter(request.id, &request.params).await,

            // Net / web3 methods
            "net_version" => JsonRpcResponse::success(request.id, self.backend.chain_id().to_string()),
            "web3_clientVersion" => JsonRpcResponse::success(request.id, client_version()),

            // Unknown method
            _ => JsonRpcResponse::error(request.id, JsonRpcError::method_not_found(&request.method)),
        }
    }

    /// Run a backend query off the async workers
    async fn blocking<T, F>(&self, query: F) -> Result<T, BackendError>
    where
        T: Send + 'static,
        F: FnOnce(&Backend) -> Result<T, BackendError> + Send + 'static,
    {
        let backend = self.backend.clone();
        tokio::task::spawn_blocking(move || query(&*backend))
            .await
            .map_err(|e| BackendError::Task(e.to_string()))?
    }

    // =========================================================================
    // ETH METHODS
    // =========================================================================

    fn eth_get_transaction_receipt(&self, id: JsonRpcId, params: &serde_json::Value) -> JsonRpcResponse {
        let hash = match first_string_param(params).and_then(|s| parse_hash(&s)) {
            Ok(h) => h,
            Err(e) => return JsonRpcResponse::error(id, JsonRpcError::invalid_params(&e)),
        };

        match self.backend.get_transaction_receipt(&hash) {
            Ok(receipt) => JsonRpcResponse::success(id, receipt),
            Err(e) => internal(id, e),
        }
    }

    async fn eth_get_block_receipts(&self, id: JsonRpcId, params: &serde_json::Value) -> JsonRpcResponse {
        let latest = match self.backend.block_number() {
            Ok(n) => n,
            Err(e) => return internal(id, e),
        };
        let number = match first_string_param(params).and_then(|s| parse_block_number(&s, latest)) {
            Ok(n) => n,
            Err(e) => return JsonRpcResponse::error(id, JsonRpcError::invalid_params(&e)),
        };

        match self.blocking(move |b| b.get_block_receipts(number)).await {
            Ok(receipts) => JsonRpcResponse::success(id, receipts),
            Err(e) => internal(id, e),
        }
    }

    fn eth_get_transaction_by_hash(&self, id: JsonRpcId, params: &serde_json::Value) -> JsonRpcResponse {
        let hash = match first_string_param(params).and_then(|s| parse_hash(&s)) {
            Ok(h) => h,
            Err(e) => return JsonRpcResponse::error(id, JsonRpcError::invalid_params(&e)),
        };

        match self.backend.get_transaction_by_hash(&hash) {
            Ok(tx) => JsonRpcResponse::success(id, tx),
            Err(e) => internal(id, e),
        }
    }

    fn eth_get_block_by_number(&self, id: JsonRpcId, params: &serde_json::Value) -> JsonRpcResponse {
        let latest = match self.backend.block_number() {
            Ok(n) => n,
            Err(e) => return internal(id, e),
        };
        let parsed = first_string_param(params)
            .and_then(|s| parse_block_number(&s, latest))
            .and_then(|n| bool_param(params, 1).map(|full| (n, full)));
        let (number, full) = match parsed {
            Ok(p) => p,
            Err(e) => return JsonRpcResponse::error(id, JsonRpcError::invalid_params(&e)),
        };

        match self.backend.get_block_by_number(number, full) {
            Ok(block) => JsonRpcResponse::success(id, block),
            Err(e) => internal(id, e),
        }
    }

    fn eth_get_block_by_hash(&self, id: JsonRpcId, params: &serde_json::Value) -> JsonRpcResponse {
        let parsed = first_string_param(params)
            .and_then(|s| parse_hash(&s))
            .and_then(|h| bool_param(params, 1).map(|full| (h, full)));
        let (hash, full) = match parsed {
            Ok(p) => p,
            Err(e) => return JsonRpcResponse::error(id, JsonRpcError::invalid_params(&e)),
        };

        match self.backend.get_block_by_hash(&hash, full) {
            Ok(block) => JsonRpcResponse::success(id, block),
            Err(e) => internal(id, e),
        }
    }

    async fn eth_get_logs(&self, id: JsonRpcId, params: &serde_json::Value) -> JsonRpcResponse {
        let filter = match LogFilter::from_params(params) {
            Ok(f) => f,
            Err(e) => return JsonRpcResponse::error(id, JsonRpcError::invalid_params(&e)),
        };
        let latest = match self.backend.block_number() {
            Ok(n) => n,
            Err(e) => return internal(id, e),
        };
        self.logs_response(id, filter, latest).await
    }

    fn eth_block_number(&self, id: JsonRpcId) -> JsonRpcResponse {
        match self.backend.block_number() {
            Ok(n) => JsonRpcResponse::success(id, to_quantity(n)),
            Err(e) => internal(id, e),
        }
    }

    // =========================================================================
    // FILTER METHODS
    // =========================================================================

    async fn eth_new_filter(&self, id: JsonRpcId, params: &serde_json::Value) -> JsonRpcResponse {
        match LogFilter::from_params(params) {
            Ok(filter) => self.install(id, FilterKind::Logs(filter)).await,
            Err(e) => JsonRpcResponse::error(id, JsonRpcError::invalid_params(&e)),
        }
    }

    async fn eth_new_block_filter(&self, id: JsonRpcId) -> JsonRpcResponse {
        self.install(id, FilterKind::Blocks).await
    }

    async fn install(&self, id: JsonRpcId, kind: FilterKind) -> JsonRpcResponse {
        let latest = match self.backend.block_number() {
            Ok(n) => n,
            Err(e) => return internal(id, e),
        };
        match self.filters.install(kind, latest).await {
            Ok(filter_id) => JsonRpcResponse::success(id, filter_id),
            Err(e) => JsonRpcResponse::error(id, JsonRpcError::limit_exceeded(&e)),
        }
    }

    /// Block hashes or logs added since the previous poll
    async fn eth_get_filter_changes(&self, id: JsonRpcId, params: &serde_json::Value) -> JsonRpcResponse {
        let filter_id = match first_string_param(params) {
            Ok(f) => f,
            Err(e) => return JsonRpcResponse::error(id, JsonRpcError::invalid_params(&e)),
        };
        let latest = match self.backend.block_number() {
            Ok(n) => n,
            Err(e) => return internal(id, e),
        };
        let Some(poll) = self.filters.poll(&filter_id, latest).await else {
            return JsonRpcResponse::error(id, JsonRpcError::filter_not_found());
        };
        let Some((from, to)) = poll.unseen else {
            return JsonRpcResponse::success(id, Vec::<String>::new());
        };

        match poll.kind {
            FilterKind::Blocks => match self.blocking(move |b| b.block_hashes(from, to)).await {
                Ok(hashes) => JsonRpcResponse::success(
                    id,
                    hashes.iter().map(|h| h.to_hex()).collect::<Vec<_>>(),
                ),
                Err(e) => internal(id, e),
            },
            FilterKind::Logs(filter) => {
                // Unseen blocks that fall inside the criteria range
                let Some((start, end)) = filter.block_range(latest) else {
                    return JsonRpcResponse::success(id, Vec::<RpcLog>::new());
                };
                let (from, to) = (from.max(start), to.min(end));
                if from > to {
                    return JsonRpcResponse::success(id, Vec::<RpcLog>::new());
                }
                match self.blocking(move |b| b.get_logs_in_range(&filter, from, to)).await {
                    Ok(logs) => JsonRpcResponse::success(id, logs),
                    Err(e) => internal(id, e),
                }
            }
        }
    }

    /// Every log matching an installed log filter
    async fn eth_get_filter_logs(&self, id: JsonRpcId, params: &serde_json::Value) -> JsonRpcResponse {
        let filter_id = match first_string_param(params) {
            Ok(f) => f,
            Err(e) => return JsonRpcResponse::error(id, JsonRpcError::invalid_params(&e)),
        };
        let filter = match self.filters.get(&filter_id).await {
            Some(FilterKind::Logs(filter)) => filter,
            Some(FilterKind::Blocks) => {
                return JsonRpcResponse::error(id, JsonRpcError::invalid_params("not a log filter"))
            }
            None => return JsonRpcResponse::error(id, JsonRpcError::filter_not_found()),
        };
        let latest = match self.backend.block_number() {
            Ok(n) => n,
            Err(e) => return internal(id, e),
        };
        self.logs_response(id, filter, latest).await
    }

    async fn eth_uninstall_filter(&self, id: JsonRpcId, params: &serde_json::Value) -> JsonRpcResponse {
        match first_string_param(params) {
            Ok(filter_id) => JsonRpcResponse::success(id, self.filters.uninstall(&filter_id).await),
            Err(e) => JsonRpcResponse::error(id, JsonRpcError::invalid_params(&e)),
        }
    }

    async fn logs_response(&self, id: JsonRpcId, filter: LogFilter, latest: BlockNumber) -> JsonRpcResponse {
        if let Some(block_hash) = filter.block_hash {
            return match self.blocking(move |b| b.get_block_logs(&filter, &block_hash)).await {
                Ok(logs) => JsonRpcResponse::success(id, logs.unwrap_or_default()),
                Err(e) => internal(id, e),
            };
        }

        let Some((from, to)) = filter.block_range(latest) else {
            return JsonRpcResponse::success(id, Vec::<RpcLog>::new());
        };
        if let Err(e) = check_range(from, to) {
            return JsonRpcResponse::error(id, JsonRpcError::limit_exceeded(&e));
        }
        match self.blocking(move |b| b.get_logs_in_range(&filter, from, to)).await {
            Ok(logs) => JsonRpcResponse::success(id, logs),
            Err(e) => internal(id, e),
        }
    }
}

fn internal(id: JsonRpcId, e: BackendError) -> JsonRpcResponse {
    error!("RPC backend error: {}", e);
    JsonRpcResponse::error(id, JsonRpcError::internal_error(&e.to_string()))
}

fn client_version() -> String {
    format!("KratOs-EVM/v{}", env!("CARGO_PKG_VERSION"))
}
