// RPC - Ethereum JSON-RPC API over the transaction index

pub mod backend;
pub mod filters;
pub mod methods;
pub mod server;
pub mod types;

// Re-export commonly used types
pub use backend::{Backend, BackendError};
pub use filters::{FilterKind, FilterManager, LogFilter};
pub use methods::RpcMethods;
pub use server::{RpcConfig, RpcServer, RpcServerError, RpcServerHandle};
pub use types::{
    BlockTag, BlockTransactions, JsonRpcError, JsonRpcId, JsonRpcRequest, JsonRpcResponse, RpcBlock,
    RpcLog, RpcTransaction, RpcTransactionReceipt,
};
