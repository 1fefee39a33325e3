// TxResult - Execution outcome of an Ethereum transaction as recorded by the ledger
use super::primitives::{BlockNumber, Gas};
use serde::{Deserialize, Serialize};

/// Position of an Ethereum transaction inside its block is unknown
pub const UNKNOWN_ETH_TX_INDEX: i32 = -1;

/// Recorded result of one Ethereum transaction.
///
/// Produced once by the state machine when the block is committed and never
/// mutated afterwards. RPC handlers only read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxResult {
    /// Block height the transaction was executed at
    pub height: BlockNumber,
    /// Index of the Ethereum transaction among Ethereum transactions of the block
    #[serde(default = "unknown_eth_tx_index")]
    pub eth_tx_index: i32,
    /// Execution reverted or failed
    pub failed: bool,
    /// Gas actually consumed by execution
    pub gas_used: Gas,
}

fn unknown_eth_tx_index() -> i32 {
    UNKNOWN_ETH_TX_INDEX
}

impl TxResult {
    pub fn new(height: BlockNumber, failed: bool, gas_used: Gas) -> Self {
        Self {
            height,
            eth_tx_index: UNKNOWN_ETH_TX_INDEX,
            failed,
            gas_used,
        }
    }

    /// Ethereum transaction index, if the ledger recorded one
    pub fn eth_index(&self) -> Option<u32> {
        u32::try_from(self.eth_tx_index).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eth_index() {
        let mut res = TxResult::new(10, false, 21_000);
        assert_eq!(res.eth_index(), None);

        res.eth_tx_index = 3;
        assert_eq!(res.eth_index(), Some(3));
    }

    #[test]
    fn test_deserialize_defaults() {
        let res: TxResult =
            serde_json::from_str(r#"{"height":7,"failed":true,"gasUsed":53026}"#).unwrap();
        assert_eq!(res, TxResult::new(7, true, 53026));
    }
}
