// Transaction - Ethereum transaction data kept alongside its execution result
use super::primitives::{quantity, Address, Gas, Hash};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Fee fields by envelope type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TxKind {
    /// Pre-EIP-2718 transaction
    #[serde(rename_all = "camelCase")]
    Legacy {
        #[serde(with = "quantity")]
        gas_price: BigUint,
    },
    /// EIP-2930 access list transaction
    #[serde(rename_all = "camelCase")]
    AccessList {
        #[serde(with = "quantity")]
        gas_price: BigUint,
        chain_id: u64,
    },
    /// EIP-1559 dynamic fee transaction
    #[serde(rename_all = "camelCase")]
    DynamicFee {
        #[serde(with = "quantity")]
        gas_fee_cap: BigUint,
        #[serde(with = "quantity")]
        gas_tip_cap: BigUint,
        chain_id: u64,
    },
}

impl TxKind {
    /// EIP-2718 envelope type byte
    pub fn type_byte(&self) -> u8 {
        match self {
            TxKind::Legacy { .. } => 0,
            TxKind::AccessList { .. } => 1,
            TxKind::DynamicFee { .. } => 2,
        }
    }
}

/// Ethereum transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthTransaction {
    pub hash: Hash,
    pub from: Address,
    /// `None` for contract creation
    #[serde(default)]
    pub to: Option<Address>,
    pub nonce: u64,
    /// Gas limit set by the sender
    pub gas: Gas,
    #[serde(with = "quantity")]
    pub value: BigUint,
    #[serde(default)]
    pub input: String,
    pub kind: TxKind,
}

impl EthTransaction {
    /// Price the sender declared: the gas price, or the fee cap for dynamic fee txs.
    ///
    /// This is the price gas reporting multiplies with the gas limit for
    /// transactions that fall under legacy accounting.
    pub fn declared_gas_price(&self) -> &BigUint {
        match &self.kind {
            TxKind::Legacy { gas_price } | TxKind::AccessList { gas_price, .. } => gas_price,
            TxKind::DynamicFee { gas_fee_cap, .. } => gas_fee_cap,
        }
    }

    /// Price actually paid per gas unit given the block base fee
    pub fn effective_gas_price(&self, base_fee: Option<&BigUint>) -> BigUint {
        match (&self.kind, base_fee) {
            (
                TxKind::DynamicFee {
                    gas_fee_cap,
                    gas_tip_cap,
                    ..
                },
                Some(base_fee),
            ) => {
                let price = gas_tip_cap + base_fee;
                if &price > gas_fee_cap {
                    gas_fee_cap.clone()
                } else {
                    price
                }
            }
            _ => self.declared_gas_price().clone(),
        }
    }

    pub fn chain_id(&self) -> Option<u64> {
        match self.kind {
            TxKind::Legacy { .. } => None,
            TxKind::AccessList { chain_id, .. } | TxKind::DynamicFee { chain_id, .. } => {
                Some(chain_id)
            }
        }
    }
}

/// Event log emitted during execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<Hash>,
    #[serde(default)]
    pub data: String,
    /// Index of the log within the block
    pub log_index: u64,
    #[serde(default)]
    pub removed: bool,
}
