// Types RPC - Structures for JSON-RPC 2.0 requests and Ethereum responses
use crate::types::{Hash, PrimitiveError};
use serde::{Deserialize, Serialize};

// =============================================================================
// JSON-RPC 2.0 PROTOCOL TYPES
// =============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0")
    pub jsonrpc: String,

    /// Method name (e.g., "eth_getTransactionReceipt")
    pub method: String,

    /// Method parameters
    #[serde(default)]
    pub params: serde_json::Value,

    /// Request ID
    pub id: JsonRpcId,
}

impl JsonRpcRequest {
    pub fn new(method: &str, params: serde_json::Value, id: i64) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: JsonRpcId::Number(id),
        }
    }
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version
    pub jsonrpc: String,

    /// Result (present on success, may be JSON null)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Error (present on failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,

    /// Request ID
    pub id: JsonRpcId,
}

impl JsonRpcResponse {
    pub fn success<T: Serialize>(id: JsonRpcId, result: T) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(serde_json::to_value(result).unwrap_or(serde_json::Value::Null)),
            error: None,
            id,
        }
    }

    pub fn error(id: JsonRpcId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// JSON-RPC Request ID (can be string, number, or null)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum JsonRpcId {
    Number(i64),
    String(String),
    Null,
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Optional additional data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    /// Invalid request (-32600)
    pub fn invalid_request(message: &str) -> Self {
        Self {
            code: -32600,
            message: format!("Invalid request: {}", message),
            data: None,
        }
    }

    /// Method not found (-32601)
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {}", method),
            data: None,
        }
    }

    /// Invalid params (-32602)
    pub fn invalid_params(message: &str) -> Self {
        Self {
            code: -32602,
            message: format!("Invalid params: {}", message),
            data: None,
        }
    }

    /// Internal error (-32603)
    pub fn internal_error(message: &str) -> Self {
        Self {
            code: -32603,
            message: format!("Internal error: {}", message),
            data: None,
        }
    }

    /// Filter not found (-32000)
    pub fn filter_not_found() -> Self {
        Self {
            code: -32000,
            message: "filter not found".to_string(),
            data: None,
        }
    }

    /// Request exceeds a server limit (-32005)
    pub fn limit_exceeded(message: &str) -> Self {
        Self {
            code: -32005,
            message: format!("Limit exceeded: {}", message),
            data: None,
        }
    }
}

// =============================================================================
// ETHEREUM RESPONSE TYPES
// =============================================================================

/// Log as returned inside receipts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: String,
    pub block_hash: String,
    pub transaction_hash: String,
    pub transaction_index: String,
    pub log_index: String,
    pub removed: bool,
}

/// Transaction receipt (eth_getTransactionReceipt)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransactionReceipt {
    pub transaction_hash: String,
    pub transaction_index: String,
    pub block_hash: String,
    pub block_number: String,
    pub from: String,
    pub to: Option<String>,
    pub cumulative_gas_used: String,
    pub gas_used: String,
    pub effective_gas_price: String,
    pub contract_address: Option<String>,
    pub logs: Vec<RpcLog>,
    pub logs_bloom: String,
    #[serde(rename = "type")]
    pub tx_type: String,
    /// 0x1 success, 0x0 failure
    pub status: String,
}

/// Transaction object (eth_getTransactionByHash)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: String,
    pub nonce: String,
    pub block_hash: String,
    pub block_number: String,
    pub transaction_index: String,
    pub from: String,
    pub to: Option<String>,
    pub value: String,
    pub gas: String,
    pub gas_price: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<String>,
    pub input: String,
    #[serde(rename = "type")]
    pub tx_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
}

/// Transactions of a block: hashes, or full objects when requested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockTransactions {
    Hashes(Vec<String>),
    Full(Vec<RpcTransaction>),
}

/// Block object (eth_getBlockByNumber / eth_getBlockByHash)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    pub number: String,
    pub hash: String,
    pub parent_hash: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_fee_per_gas: Option<String>,
    pub gas_used: String,
    pub logs_bloom: String,
    pub transactions: BlockTransactions,
}

// =============================================================================
// PARAM PARSING
// =============================================================================

/// Block parameter before it is resolved against the chain head
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Earliest,
    Number(u64),
}

impl BlockTag {
    /// Hex quantity or "latest"/"safe"/"finalized"/"earliest"
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "latest" | "safe" | "finalized" => Ok(BlockTag::Latest),
            "earliest" => Ok(BlockTag::Earliest),
            "pending" => Err("Pending block not supported".to_string()),
            _ => parse_quantity(s)
                .map(BlockTag::Number)
                .map_err(|_| format!("Invalid block number: {}", s)),
        }
    }

    pub fn resolve(self, latest: u64) -> u64 {
        match self {
            BlockTag::Latest => latest,
            BlockTag::Earliest => 0,
            BlockTag::Number(n) => n,
        }
    }
}

/// Parse a `0x`-prefixed hex quantity
pub fn parse_quantity(s: &str) -> Result<u64, String> {
    let hex_str = s
        .strip_prefix("0x")
        .ok_or_else(|| format!("Invalid quantity: {}", s))?;
    u64::from_str_radix(hex_str, 16).map_err(|_| format!("Invalid quantity: {}", s))
}

/// Parse a transaction or block hash parameter
pub fn parse_hash(s: &str) -> Result<Hash, String> {
    if !s.starts_with("0x") {
        return Err("Hash must start with 0x".to_string());
    }
    s.parse().map_err(|e: PrimitiveError| e.to_string())
}

/// Parse a block number parameter: hex quantity or "latest"/"earliest"
pub fn parse_block_number(s: &str, latest: u64) -> Result<u64, String> {
    BlockTag::parse(s).map(|tag| tag.resolve(latest))
}

/// First positional parameter as a string
pub fn first_string_param(params: &serde_json::Value) -> Result<String, String> {
    match params {
        serde_json::Value::Array(arr) if !arr.is_empty() => arr[0]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| "Expected string parameter".to_string()),
        _ => Err("Expected [param]".to_string()),
    }
}

/// Optional boolean parameter at `index`, `false` when absent
pub fn bool_param(params: &serde_json::Value, index: usize) -> Result<bool, String> {
    match params.get(index) {
        None | Some(serde_json::Value::Null) => Ok(false),
        Some(serde_json::Value::Bool(b)) => Ok(*b),
        Some(_) => Err(format!("Expected boolean parameter at position {}", index)),
    }
}
