// Backend - Builds Ethereum RPC objects from indexed transaction results
use crate::execution::{CutoverHeight, GasUsageResolver};
use crate::rpc::filters::LogFilter;
use crate::rpc::types::{BlockTransactions, RpcBlock, RpcLog, RpcTransaction, RpcTransactionReceipt};
use crate::storage::{IndexedBlock, IndexedTransaction, IndexerError, TxResultStore};
use crate::types::*;
use num_bigint::BigUint;
use std::sync::Arc;
use tracing::warn;

/// Empty 256-byte logs bloom. Blooms are not indexed.
fn empty_bloom() -> String {
    format!("0x{}", "00".repeat(256))
}

/// Read side of the Ethereum JSON-RPC API
pub struct Backend {
    store: Arc<dyn TxResultStore>,
    resolver: GasUsageResolver<Arc<dyn CutoverHeight>>,
    chain_id: u64,
}

impl Backend {
    pub fn new(
        store: Arc<dyn TxResultStore>,
        cutover: Arc<dyn CutoverHeight>,
        chain_id: u64,
    ) -> Self {
        Self {
            store,
            resolver: GasUsageResolver::new(cutover),
            chain_id,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Gas used to report for a transaction, see [`GasUsageResolver::resolve`]
    pub fn get_gas_used(&self, tx_result: &TxResult, gas_price: &BigUint, gas_limit: Gas) -> Gas {
        self.resolver.resolve(tx_result, gas_price, gas_limit)
    }

    fn reported_gas_used(&self, tx: &IndexedTransaction) -> Gas {
        self.get_gas_used(
            &tx.tx_result,
            tx.transaction.declared_gas_price(),
            tx.transaction.gas,
        )
    }

    /// Highest indexed block, 0 before anything was indexed
    pub fn block_number(&self) -> Result<BlockNumber, BackendError> {
        Ok(self.store.last_indexed_block()?.unwrap_or(0))
    }

    pub fn get_transaction_by_hash(
        &self,
        hash: &Hash,
    ) -> Result<Option<RpcTransaction>, BackendError> {
        let Some(tx) = self.store.get_by_hash(hash)? else {
            return Ok(None);
        };
        let index = eth_index(&tx)?;
        let block = self.block_of(&tx)?;
        Ok(Some(rpc_transaction(&tx, &block, index)))
    }

    pub fn get_transaction_receipt(
        &self,
        hash: &Hash,
    ) -> Result<Option<RpcTransactionReceipt>, BackendError> {
        let Some(tx) = self.store.get_by_hash(hash)? else {
            return Ok(None);
        };
        let index = eth_index(&tx)?;
        let block = self.block_of(&tx)?;

        // Recorded gas of the earlier transactions of the block
        let mut cumulative: Gas = 0;
        for i in 0..index {
            let prior = self
                .store
                .get_by_block_and_index(block.number, i)?
                .ok_or(BackendError::MissingTransaction {
                    block: block.number,
                    index: i,
                })?;
            cumulative = cumulative.wrapping_add(prior.tx_result.gas_used);
        }

        Ok(Some(self.receipt(&tx, &block, index, cumulative)))
    }

    /// All receipts of a block, `None` if the block is not indexed
    pub fn get_block_receipts(
        &self,
        number: BlockNumber,
    ) -> Result<Option<Vec<RpcTransactionReceipt>>, BackendError> {
        let Some(block) = self.store.get_block(number)? else {
            return Ok(None);
        };

        let txs = self.block_transactions(&block)?;
        let mut receipts = Vec::with_capacity(txs.len());
        let mut cumulative: Gas = 0;
        for (i, tx) in txs.iter().enumerate() {
            receipts.push(self.receipt(tx, &block, i as u32, cumulative));
            cumulative = cumulative.wrapping_add(tx.tx_result.gas_used);
        }

        Ok(Some(receipts))
    }

    pub fn get_block_by_number(
        &self,
        number: BlockNumber,
        full_transactions: bool,
    ) -> Result<Option<RpcBlock>, BackendError> {
        match self.store.get_block(number)? {
            Some(block) => self.rpc_block(&block, full_transactions).map(Some),
            None => Ok(None),
        }
    }

    pub fn get_block_by_hash(
        &self,
        hash: &Hash,
        full_transactions: bool,
    ) -> Result<Option<RpcBlock>, BackendError> {
        match self.store.get_block_by_hash(hash)? {
            Some(block) => self.rpc_block(&block, full_transactions).map(Some),
            None => Ok(None),
        }
    }

    /// Hashes of the indexed blocks in `from..=to`
    pub fn block_hashes(
        &self,
        from: BlockNumber,
        to: BlockNumber,
    ) -> Result<Vec<Hash>, BackendError> {
        let mut hashes = Vec::new();
        for number in from..=to {
            if let Some(block) = self.store.get_block(number)? {
                hashes.push(block.hash);
            }
        }
        Ok(hashes)
    }

    /// Logs matching `filter` in blocks `from..=to`, in chain order
    pub fn get_logs_in_range(
        &self,
        filter: &LogFilter,
        from: BlockNumber,
        to: BlockNumber,
    ) -> Result<Vec<RpcLog>, BackendError> {
        let mut logs = Vec::new();
        for number in from..=to {
            if let Some(block) = self.store.get_block(number)? {
                logs.extend(self.block_logs(filter, &block)?);
            }
        }
        Ok(logs)
    }

    /// Logs matching `filter` in one block, `None` if the block is not indexed
    pub fn get_block_logs(
        &self,
        filter: &LogFilter,
        block_hash: &Hash,
    ) -> Result<Option<Vec<RpcLog>>, BackendError> {
        match self.store.get_block_by_hash(block_hash)? {
            Some(block) => self.block_logs(filter, &block).map(Some),
            None => Ok(None),
        }
    }

    fn block_logs(
        &self,
        filter: &LogFilter,
        block: &IndexedBlock,
    ) -> Result<Vec<RpcLog>, BackendError> {
        if block.transactions.is_empty() {
            return Ok(Vec::new());
        }

        let mut logs = Vec::new();
        for (i, tx) in self.block_transactions(block)?.iter().enumerate() {
            logs.extend(
                tx.logs
                    .iter()
                    .filter(|log| filter.matches(log))
                    .map(|log| rpc_log(log, tx, block, i as u32)),
            );
        }
        Ok(logs)
    }

    /// Transactions of `block` in Ethereum index order
    fn block_transactions(
        &self,
        block: &IndexedBlock,
    ) -> Result<Vec<IndexedTransaction>, BackendError> {
        block
            .transactions
            .iter()
            .enumerate()
            .map(|(i, hash)| {
                self.store
                    .get_by_hash(hash)?
                    .ok_or(BackendError::MissingTransaction {
                        block: block.number,
                        index: i as u32,
                    })
            })
            .collect()
    }

    fn rpc_block(
        &self,
        block: &IndexedBlock,
        full_transactions: bool,
    ) -> Result<RpcBlock, BackendError> {
        let txs = self.block_transactions(block)?;
        let gas_used = txs
            .iter()
            .fold(0 as Gas, |acc, tx| acc.wrapping_add(tx.tx_result.gas_used));

        // Parent is only known when the previous height is indexed
        let parent_hash = match block.number.checked_sub(1) {
            Some(parent) => self.store.get_block(parent)?.map(|b| b.hash.to_hex()),
            None => None,
        }
        .unwrap_or_else(|| format!("0x{}", "00".repeat(32)));

        let transactions = if full_transactions {
            BlockTransactions::Full(
                txs.iter()
                    .enumerate()
                    .map(|(i, tx)| rpc_transaction(tx, block, i as u32))
                    .collect(),
            )
        } else {
            BlockTransactions::Hashes(txs.iter().map(|tx| tx.hash().to_hex()).collect())
        };

        Ok(RpcBlock {
            number: to_quantity(block.number),
            hash: block.hash.to_hex(),
            parent_hash,
            timestamp: to_quantity(block.timestamp),
            base_fee_per_gas: block.base_fee.as_ref().map(big_to_quantity),
            gas_used: to_quantity(gas_used),
            logs_bloom: empty_bloom(),
            transactions,
        })
    }

    fn block_of(&self, tx: &IndexedTransaction) -> Result<IndexedBlock, BackendError> {
        self.store
            .get_block(tx.tx_result.height)?
            .ok_or(BackendError::MissingBlock(tx.tx_result.height))
    }

    /// `cumulative_before` is the recorded gas of the transactions preceding this one
    fn receipt(
        &self,
        tx: &IndexedTransaction,
        block: &IndexedBlock,
        index: u32,
        cumulative_before: Gas,
    ) -> RpcTransactionReceipt {
        let gas_used = self.reported_gas_used(tx);
        let logs = tx
            .logs
            .iter()
            .map(|log| rpc_log(log, tx, block, index))
            .collect();

        // Only creations carry a contract address
        let contract_address = match tx.transaction.to {
            None => tx.contract_address.map(|a| a.to_hex()),
            Some(_) => None,
        };

        RpcTransactionReceipt {
            transaction_hash: tx.hash().to_hex(),
            transaction_index: to_quantity(index as u64),
            block_hash: block.hash.to_hex(),
            block_number: to_quantity(block.number),
            from: tx.transaction.from.to_hex(),
            to: tx.transaction.to.map(|a| a.to_hex()),
            cumulative_gas_used: to_quantity(
                cumulative_before.wrapping_add(tx.tx_result.gas_used),
            ),
            gas_used: to_quantity(gas_used),
            effective_gas_price: big_to_quantity(
                &tx.transaction.effective_gas_price(block.base_fee.as_ref()),
            ),
            contract_address,
            logs,
            logs_bloom: empty_bloom(),
            tx_type: to_quantity(tx.transaction.kind.type_byte() as u64),
            status: if tx.tx_result.failed { "0x0" } else { "0x1" }.to_string(),
        }
    }
}

fn eth_index(tx: &IndexedTransaction) -> Result<u32, BackendError> {
    tx.tx_result.eth_index().ok_or_else(|| {
        warn!("Transaction {} indexed without position", tx.hash());
        BackendError::MissingIndex(tx.hash())
    })
}

fn rpc_log(log: &Log, tx: &IndexedTransaction, block: &IndexedBlock, index: u32) -> RpcLog {
    RpcLog {
        address: log.address.to_hex(),
        topics: log.topics.iter().map(Hash::to_hex).collect(),
        data: if log.data.is_empty() {
            "0x".to_string()
        } else {
            log.data.clone()
        },
        block_number: to_quantity(block.number),
        block_hash: block.hash.to_hex(),
        transaction_hash: tx.hash().to_hex(),
        transaction_index: to_quantity(index as u64),
        log_index: to_quantity(log.log_index),
        removed: log.removed,
    }
}

fn rpc_transaction(tx: &IndexedTransaction, block: &IndexedBlock, index: u32) -> RpcTransaction {
    let t = &tx.transaction;
    let (max_fee_per_gas, max_priority_fee_per_gas) = match &t.kind {
        TxKind::DynamicFee {
            gas_fee_cap,
            gas_tip_cap,
            ..
        } => (
            Some(big_to_quantity(gas_fee_cap)),
            Some(big_to_quantity(gas_tip_cap)),
        ),
        _ => (None, None),
    };

    RpcTransaction {
        hash: t.hash.to_hex(),
        nonce: to_quantity(t.nonce),
        block_hash: block.hash.to_hex(),
        block_number: to_quantity(block.number),
        transaction_index: to_quantity(index as u64),
        from: t.from.to_hex(),
        to: t.to.map(|a| a.to_hex()),
        value: big_to_quantity(&t.value),
        gas: to_quantity(t.gas),
        gas_price: big_to_quantity(&t.effective_gas_price(block.base_fee.as_ref())),
        max_fee_per_gas,
        max_priority_fee_per_gas,
        input: if t.input.is_empty() {
            "0x".to_string()
        } else {
            t.input.clone()
        },
        tx_type: to_quantity(t.kind.type_byte() as u64),
        chain_id: t.chain_id().map(to_quantity),
    }
}

/// Backend errors
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error(transparent)]
    Store(#[from] IndexerError),

    #[error("Block {0} not indexed")]
    MissingBlock(BlockNumber),

    #[error("Transaction {index} of block {block} not indexed")]
    MissingTransaction { block: BlockNumber, index: u32 },

    #[error("Transaction {0} has no block position")]
    MissingIndex(Hash),

    #[error("Query task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::GasAccountingConfig;
    use crate::storage::indexer::test_utils::*;
    use crate::storage::KvIndexer;
    use tempfile::TempDir;

    fn setup(cutover: Arc<dyn CutoverHeight>) -> (TempDir, KvIndexer, Backend) {
        let temp_dir = TempDir::new().unwrap();
        let indexer = KvIndexer::open(temp_dir.path()).unwrap();
        let backend = Backend::new(Arc::new(indexer.clone()), cutover, 9000);
        (temp_dir, indexer, backend)
    }

    fn index(indexer: &KvIndexer, number: BlockNumber, txs: Vec<IndexedTransaction>) {
        indexer.index_block(&block_for(number, &txs), &txs).unwrap();
    }

    #[test]
    fn test_get_gas_used_scenarios() {
        let (_dir, _indexer, backend) = setup(Arc::new(1u64));
        let price = BigUint::from(200_000u32);
        assert_eq!(
            backend.get_gas_used(&TxResult::new(1, false, 53026), &BigUint::from(0u8), 0),
            53026
        );

        let (_dir, _indexer, backend) = setup(Arc::new(2u64));
        assert_eq!(
            backend.get_gas_used(&TxResult::new(1, true, 53026), &price, 5_000_000_000_000),
            1_000_000_000_000_000_000
        );
        assert_eq!(
            backend.get_gas_used(&TxResult::new(3, true, 53026), &price, 5_000_000_000_000),
            53026
        );
    }

    #[test]
    fn test_receipt_unknown_hash_is_none() {
        let (_dir, _indexer, backend) = setup(Arc::new(0u64));
        assert!(backend
            .get_transaction_receipt(&tx_hash(1, 0))
            .unwrap()
            .is_none());
        assert!(backend
            .get_transaction_by_hash(&tx_hash(1, 0))
            .unwrap()
            .is_none());
        assert_eq!(backend.block_number().unwrap(), 0);
    }

    #[test]
    fn test_receipt_legacy_and_corrected_accounting() {
        let (_dir, indexer, backend) = setup(Arc::new(2u64));
        index(
            &indexer,
            1,
            vec![legacy_tx(1, 0, true, 53026, 200_000, 5_000_000_000_000)],
        );
        index(
            &indexer,
            3,
            vec![legacy_tx(3, 0, true, 53026, 200_000, 5_000_000_000_000)],
        );

        let before = backend.get_transaction_receipt(&tx_hash(1, 0)).unwrap().unwrap();
        assert_eq!(before.gas_used, to_quantity(1_000_000_000_000_000_000));
        assert_eq!(before.status, "0x0");

        // Cumulative gas adds up recorded gas, whatever the reported value
        assert_eq!(before.cumulative_gas_used, to_quantity(53026));

        let after = backend.get_transaction_receipt(&tx_hash(3, 0)).unwrap().unwrap();
        assert_eq!(after.gas_used, to_quantity(53026));
        assert_eq!(after.cumulative_gas_used, to_quantity(53026));
        assert_eq!(backend.block_number().unwrap(), 3);
    }

    #[test]
    fn test_cumulative_gas_used() {
        let (_dir, indexer, backend) = setup(Arc::new(0u64));
        index(
            &indexer,
            7,
            vec![
                legacy_tx(7, 0, false, 21_000, 1, 21_000),
                legacy_tx(7, 1, true, 30_000, 1, 100_000),
                legacy_tx(7, 2, false, 50_000, 1, 60_000),
            ],
        );

        let receipt = backend.get_transaction_receipt(&tx_hash(7, 2)).unwrap().unwrap();
        assert_eq!(receipt.cumulative_gas_used, to_quantity(101_000));
        assert_eq!(receipt.transaction_index, "0x2");
        assert_eq!(receipt.status, "0x1");

        let receipts = backend.get_block_receipts(7).unwrap().unwrap();
        assert_eq!(receipts.len(), 3);
        assert_eq!(receipts[0].cumulative_gas_used, to_quantity(21_000));
        assert_eq!(receipts[1].cumulative_gas_used, to_quantity(51_000));
        assert_eq!(receipts[2], receipt);

        assert!(backend.get_block_receipts(8).unwrap().is_none());
    }

    #[test]
    fn test_receipt_follows_config_reload() {
        let config = GasAccountingConfig::new(10);
        let (_dir, indexer, backend) = setup(Arc::new(config.clone()));
        index(&indexer, 5, vec![legacy_tx(5, 0, true, 21_000, 3, 40_000)]);

        let receipt = backend.get_transaction_receipt(&tx_hash(5, 0)).unwrap().unwrap();
        assert_eq!(receipt.gas_used, to_quantity(120_000));

        config.set_fix_revert_gas_refund_height(5);
        let receipt = backend.get_transaction_receipt(&tx_hash(5, 0)).unwrap().unwrap();
        assert_eq!(receipt.gas_used, to_quantity(21_000));
    }

    #[test]
    fn test_dynamic_fee_receipt_and_transaction() {
        let (_dir, indexer, backend) = setup(Arc::new(100u64));
        let mut tx = legacy_tx(4, 0, true, 21_000, 0, 50_000);
        tx.transaction.kind = TxKind::DynamicFee {
            gas_fee_cap: BigUint::from(10u8),
            gas_tip_cap: BigUint::from(1u8),
            chain_id: 9000,
        };
        let mut block = block_for(4, std::slice::from_ref(&tx));
        block.base_fee = Some(BigUint::from(7u8));
        indexer.index_block(&block, std::slice::from_ref(&tx)).unwrap();

        let receipt = backend.get_transaction_receipt(&tx_hash(4, 0)).unwrap().unwrap();
        // Legacy accounting multiplies the fee cap, not the effective price
        assert_eq!(receipt.gas_used, to_quantity(500_000));
        assert_eq!(receipt.effective_gas_price, "0x8");
        assert_eq!(receipt.tx_type, "0x2");

        let rpc_tx = backend.get_transaction_by_hash(&tx_hash(4, 0)).unwrap().unwrap();
        assert_eq!(rpc_tx.gas_price, "0x8");
        assert_eq!(rpc_tx.max_fee_per_gas.as_deref(), Some("0xa"));
        assert_eq!(rpc_tx.chain_id.as_deref(), Some("0x2328"));
    }

    #[test]
    fn test_contract_creation_receipt() {
        let (_dir, indexer, backend) = setup(Arc::new(0u64));
        let mut tx = legacy_tx(2, 0, false, 100_000, 1, 200_000);
        tx.transaction.to = None;
        tx.contract_address = Some(Address::from_bytes([0xcc; 20]));
        tx.logs = vec![Log {
            address: Address::from_bytes([0xcc; 20]),
            topics: vec![Hash::from_bytes([0x01; 32])],
            data: String::new(),
            log_index: 0,
            removed: false,
        }];
        index(&indexer, 2, vec![tx]);

        let receipt = backend.get_transaction_receipt(&tx_hash(2, 0)).unwrap().unwrap();
        assert_eq!(receipt.to, None);
        assert_eq!(receipt.contract_address, Some(format!("0x{}", "cc".repeat(20))));
        assert_eq!(receipt.logs.len(), 1);
        assert_eq!(receipt.logs[0].data, "0x");
        assert_eq!(receipt.logs[0].transaction_hash, tx_hash(2, 0).to_hex());
    }

    fn log_at(address: u8, topics: &[u8], log_index: u64) -> Log {
        Log {
            address: Address::from_bytes([address; 20]),
            topics: topics.iter().map(|t| Hash::from_bytes([*t; 32])).collect(),
            data: "0x01".to_string(),
            log_index,
            removed: false,
        }
    }

    #[test]
    fn test_cumulative_gas_uses_recorded_values_below_fix() {
        let (_dir, indexer, backend) = setup(Arc::new(100u64));
        index(
            &indexer,
            7,
            vec![
                legacy_tx(7, 0, true, 30_000, 2, 100_000),
                legacy_tx(7, 1, false, 21_000, 2, 21_000),
            ],
        );

        let receipts = backend.get_block_receipts(7).unwrap().unwrap();
        assert_eq!(receipts[0].gas_used, to_quantity(200_000));
        assert_eq!(receipts[0].cumulative_gas_used, to_quantity(30_000));
        assert_eq!(receipts[1].cumulative_gas_used, to_quantity(51_000));
        assert_eq!(
            backend.get_transaction_receipt(&tx_hash(7, 1)).unwrap().unwrap(),
            receipts[1]
        );
    }

    #[test]
    fn test_block_by_number_and_hash() {
        let (_dir, indexer, backend) = setup(Arc::new(0u64));
        index(&indexer, 1, vec![]);
        index(
            &indexer,
            2,
            vec![
                legacy_tx(2, 0, false, 21_000, 1, 21_000),
                legacy_tx(2, 1, true, 30_000, 1, 90_000),
            ],
        );

        let block = backend.get_block_by_number(2, false).unwrap().unwrap();
        assert_eq!(block.number, "0x2");
        assert_eq!(block.parent_hash, block_hash(1).to_hex());
        assert_eq!(block.gas_used, to_quantity(51_000));
        assert_eq!(
            block.transactions,
            BlockTransactions::Hashes(vec![tx_hash(2, 0).to_hex(), tx_hash(2, 1).to_hex()])
        );

        let full = backend.get_block_by_hash(&block_hash(2), true).unwrap().unwrap();
        assert_eq!(full.hash, block_hash(2).to_hex());
        match full.transactions {
            BlockTransactions::Full(txs) => {
                assert_eq!(txs.len(), 2);
                assert_eq!(txs[1].transaction_index, "0x1");
            }
            other => panic!("expected full transactions, got {:?}", other),
        }

        // Height 1 has no indexed parent
        let first = backend.get_block_by_number(1, false).unwrap().unwrap();
        assert_eq!(first.parent_hash, format!("0x{}", "00".repeat(32)));

        assert!(backend.get_block_by_number(3, false).unwrap().is_none());
        assert!(backend.get_block_by_hash(&block_hash(3), false).unwrap().is_none());
        assert_eq!(backend.block_hashes(1, 3).unwrap(), vec![block_hash(1), block_hash(2)]);
    }

    #[test]
    fn test_logs_by_address_and_topic() {
        let (_dir, indexer, backend) = setup(Arc::new(0u64));
        let mut first = legacy_tx(4, 0, false, 40_000, 1, 50_000);
        first.logs = vec![log_at(0xc1, &[0x01, 0x02], 0), log_at(0xc2, &[0x01], 1)];
        let mut second = legacy_tx(5, 0, false, 40_000, 1, 50_000);
        second.logs = vec![log_at(0xc1, &[0x03], 0)];
        index(&indexer, 4, vec![first]);
        index(&indexer, 5, vec![second]);

        let by_address = LogFilter {
            addresses: vec![Address::from_bytes([0xc1; 20])],
            ..Default::default()
        };
        let logs = backend.get_logs_in_range(&by_address, 0, 5).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].block_number, "0x4");
        assert_eq!(logs[1].block_number, "0x5");

        let by_topic = LogFilter {
            topics: vec![Some(vec![Hash::from_bytes([0x01; 32])])],
            ..Default::default()
        };
        let logs = backend.get_logs_in_range(&by_topic, 4, 4).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].log_index, "0x1");
        assert!(backend.get_logs_in_range(&by_topic, 5, 5).unwrap().is_empty());

        let in_block = backend.get_block_logs(&by_address, &block_hash(5)).unwrap().unwrap();
        assert_eq!(in_block.len(), 1);
        assert_eq!(in_block[0].topics, vec![Hash::from_bytes([0x03; 32]).to_hex()]);
        assert!(backend.get_block_logs(&by_address, &block_hash(6)).unwrap().is_none());
    }
}
