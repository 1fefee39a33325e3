// Indexer - Transaction results by hash and by block position
//
// Key layout:
//   tx/<hash>                      -> IndexedTransaction
//   bi/<number be64><index be32>   -> tx hash
//   blk/<number be64>              -> IndexedBlock
//   blkh/<hash>                    -> block number (be64)
//   meta/last                      -> highest indexed block
use super::db::{Database, DatabaseError, DbBatch};
use crate::types::{opt_quantity, Address, BlockNumber, EthTransaction, Hash, Log, TxResult};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const TX_PREFIX: &[u8] = b"tx/";
const BLOCK_INDEX_PREFIX: &[u8] = b"bi/";
const BLOCK_PREFIX: &[u8] = b"blk/";
const BLOCK_HASH_PREFIX: &[u8] = b"blkh/";
const LAST_BLOCK_KEY: &[u8] = b"meta/last";

/// Everything the RPC layer needs to describe one executed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedTransaction {
    pub tx_result: TxResult,
    pub transaction: EthTransaction,
    pub block_hash: Hash,
    /// Address of the contract created, for creation transactions
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub logs: Vec<Log>,
}

impl IndexedTransaction {
    pub fn hash(&self) -> Hash {
        self.transaction.hash
    }
}

/// Block header fields served over RPC plus its Ethereum transactions in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedBlock {
    pub number: BlockNumber,
    pub hash: Hash,
    #[serde(with = "opt_quantity", default)]
    pub base_fee: Option<BigUint>,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub transactions: Vec<Hash>,
}

/// Read access to recorded transaction results
pub trait TxResultStore: Send + Sync {
    fn get_by_hash(&self, hash: &Hash) -> Result<Option<IndexedTransaction>, IndexerError>;

    /// Look up by block height and Ethereum transaction index
    fn get_by_block_and_index(
        &self,
        number: BlockNumber,
        index: u32,
    ) -> Result<Option<IndexedTransaction>, IndexerError>;

    fn get_block(&self, number: BlockNumber) -> Result<Option<IndexedBlock>, IndexerError>;

    fn get_block_by_hash(&self, hash: &Hash) -> Result<Option<IndexedBlock>, IndexerError>;

    fn last_indexed_block(&self) -> Result<Option<BlockNumber>, IndexerError>;
}

/// RocksDB-backed transaction indexer.
///
/// Clones share the database and the writer lock, so concurrent
/// `index_block` calls are serialized.
#[derive(Clone)]
pub struct KvIndexer {
    db: Database,
    write_lock: Arc<Mutex<()>>,
}

impl KvIndexer {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IndexerError> {
        let path = path.as_ref();
        info!("Opening transaction index at {}", path.display());
        Ok(Self::new(Database::open(path)?))
    }

    /// Index a committed block and its transactions in one atomic write.
    ///
    /// Records are immutable: a block can only be indexed once and a
    /// transaction hash belongs to a single block position.
    pub fn index_block(
        &self,
        block: &IndexedBlock,
        txs: &[IndexedTransaction],
    ) -> Result<(), IndexerError> {
        // Checks below read state the batch depends on
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if self.get_block(block.number)?.is_some() {
            return Err(IndexerError::AlreadyIndexed(block.number));
        }

        if txs.len() != block.transactions.len() {
            return Err(IndexerError::TransactionCountMismatch {
                block: block.number,
                expected: block.transactions.len(),
                actual: txs.len(),
            });
        }

        if self.db.get(&block_hash_key(&block.hash))?.is_some() {
            return Err(IndexerError::DuplicateBlockHash(block.hash));
        }

        let mut seen = HashSet::with_capacity(txs.len());
        let mut batch = DbBatch::new();
        for (position, (tx, expected_hash)) in txs.iter().zip(&block.transactions).enumerate() {
            let mut tx = tx.clone();
            let hash = tx.hash();

            if hash != *expected_hash {
                return Err(IndexerError::InconsistentTransaction {
                    hash,
                    reason: format!("expected {} at position {}", expected_hash, position),
                });
            }
            if tx.tx_result.height != block.number {
                return Err(IndexerError::InconsistentTransaction {
                    hash,
                    reason: format!(
                        "recorded at height {}, block is {}",
                        tx.tx_result.height, block.number
                    ),
                });
            }
            if tx.block_hash != block.hash {
                return Err(IndexerError::InconsistentTransaction {
                    hash,
                    reason: "block hash mismatch".to_string(),
                });
            }
            if !seen.insert(hash) || self.db.get(&tx_key(&hash))?.is_some() {
                return Err(IndexerError::DuplicateTransaction(hash));
            }

            let position = position as u32;
            match tx.tx_result.eth_index() {
                None => tx.tx_result.eth_tx_index = position as i32,
                Some(index) if index == position => {}
                Some(index) => {
                    return Err(IndexerError::InconsistentTransaction {
                        hash,
                        reason: format!("eth tx index {} at position {}", index, position),
                    });
                }
            }

            batch.put_encoded(&tx_key(&hash), &tx)?;
            batch.put_raw(&block_index_key(block.number, position), hash.as_bytes());
        }

        batch.put_encoded(&block_key(block.number), block)?;
        batch.put_raw(&block_hash_key(&block.hash), &block.number.to_be_bytes());

        let last = self.last_indexed_block()?;
        if last.map_or(true, |last| block.number > last) {
            batch.put_encoded(LAST_BLOCK_KEY, &block.number)?;
        }

        self.db.write(batch)?;
        debug!("Indexed block {} with {} transactions", block.number, txs.len());
        Ok(())
    }
}

impl TxResultStore for KvIndexer {
    fn get_by_hash(&self, hash: &Hash) -> Result<Option<IndexedTransaction>, IndexerError> {
        Ok(self.db.get_decoded(&tx_key(hash))?)
    }

    fn get_by_block_and_index(
        &self,
        number: BlockNumber,
        index: u32,
    ) -> Result<Option<IndexedTransaction>, IndexerError> {
        let Some(raw) = self.db.get(&block_index_key(number, index))? else {
            return Ok(None);
        };
        let bytes: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| IndexerError::Corrupted(format!("bad tx hash under block {} index {}", number, index)))?;
        self.get_by_hash(&Hash::from_bytes(bytes))
    }

    fn get_block(&self, number: BlockNumber) -> Result<Option<IndexedBlock>, IndexerError> {
        Ok(self.db.get_decoded(&block_key(number))?)
    }

    fn get_block_by_hash(&self, hash: &Hash) -> Result<Option<IndexedBlock>, IndexerError> {
        let Some(raw) = self.db.get(&block_hash_key(hash))? else {
            return Ok(None);
        };
        let bytes: [u8; 8] = raw
            .as_slice()
            .try_into()
            .map_err(|_| IndexerError::Corrupted(format!("bad block number for hash {}", hash)))?;
        self.get_block(u64::from_be_bytes(bytes))
    }

    fn last_indexed_block(&self) -> Result<Option<BlockNumber>, IndexerError> {
        Ok(self.db.get_decoded(LAST_BLOCK_KEY)?)
    }
}

fn tx_key(hash: &Hash) -> Vec<u8> {
    [TX_PREFIX, hash.as_bytes().as_slice()].concat()
}

fn block_index_key(number: BlockNumber, index: u32) -> Vec<u8> {
    [
        BLOCK_INDEX_PREFIX,
        number.to_be_bytes().as_slice(),
        index.to_be_bytes().as_slice(),
    ]
    .concat()
}

fn block_key(number: BlockNumber) -> Vec<u8> {
    [BLOCK_PREFIX, number.to_be_bytes().as_slice()].concat()
}

fn block_hash_key(hash: &Hash) -> Vec<u8> {
    [BLOCK_HASH_PREFIX, hash.as_bytes().as_slice()].concat()
}

/// Indexer errors
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Block {0} already indexed")]
    AlreadyIndexed(BlockNumber),

    #[error("Block {block} lists {expected} transactions, got {actual}")]
    TransactionCountMismatch {
        block: BlockNumber,
        expected: usize,
        actual: usize,
    },

    #[error("Transaction {0} already indexed")]
    DuplicateTransaction(Hash),

    #[error("Block hash {0} already indexed")]
    DuplicateBlockHash(Hash),

    #[error("Inconsistent transaction {hash}: {reason}")]
    InconsistentTransaction { hash: Hash, reason: String },

    #[error("Corrupted index: {0}")]
    Corrupted(String),
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;
    use crate::types::TxKind;

    pub fn block_hash(number: BlockNumber) -> Hash {
        let mut bytes = [0xb0; 32];
        bytes[24..].copy_from_slice(&number.to_be_bytes());
        Hash::from_bytes(bytes)
    }

    pub fn tx_hash(number: BlockNumber, position: u8) -> Hash {
        let mut bytes = [0x70; 32];
        bytes[23..31].copy_from_slice(&number.to_be_bytes());
        bytes[31] = position;
        Hash::from_bytes(bytes)
    }

    pub fn legacy_tx(
        number: BlockNumber,
        position: u8,
        failed: bool,
        gas_used: u64,
        gas_price: u64,
        gas_limit: u64,
    ) -> IndexedTransaction {
        IndexedTransaction {
            tx_result: TxResult::new(number, failed, gas_used),
            transaction: EthTransaction {
                hash: tx_hash(number, position),
                from: Address::from_bytes([0xaa; 20]),
                to: Some(Address::from_bytes([0xbb; 20])),
                nonce: position as u64,
                gas: gas_limit,
                value: BigUint::from(0u8),
                input: "0x".to_string(),
                kind: TxKind::Legacy {
                    gas_price: BigUint::from(gas_price),
                },
            },
            block_hash: block_hash(number),
            contract_address: None,
            logs: vec![],
        }
    }

    pub fn block_for(number: BlockNumber, txs: &[IndexedTransaction]) -> IndexedBlock {
        IndexedBlock {
            number,
            hash: block_hash(number),
            base_fee: None,
            timestamp: 1_700_000_000 + number,
            transactions: txs.iter().map(|tx| tx.hash()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;
    use tempfile::TempDir;

    fn open_indexer() -> (TempDir, KvIndexer) {
        let temp_dir = TempDir::new().unwrap();
        let indexer = KvIndexer::open(temp_dir.path()).unwrap();
        (temp_dir, indexer)
    }

    #[test]
    fn test_index_and_lookup() {
        let (_dir, indexer) = open_indexer();
        let txs = vec![
            legacy_tx(10, 0, false, 21_000, 1, 30_000),
            legacy_tx(10, 1, true, 53_026, 200_000, 100_000),
        ];
        let block = block_for(10, &txs);
        indexer.index_block(&block, &txs).unwrap();

        let found = indexer.get_by_hash(&tx_hash(10, 1)).unwrap().unwrap();
        assert_eq!(found.tx_result.gas_used, 53_026);
        assert!(found.tx_result.failed);
        // Position filled in when the ledger did not record it
        assert_eq!(found.tx_result.eth_index(), Some(1));

        let by_pos = indexer.get_by_block_and_index(10, 0).unwrap().unwrap();
        assert_eq!(by_pos.hash(), tx_hash(10, 0));
        assert!(indexer.get_by_block_and_index(10, 2).unwrap().is_none());

        assert_eq!(indexer.get_block(10).unwrap(), Some(block));
        assert_eq!(indexer.last_indexed_block().unwrap(), Some(10));
    }

    #[test]
    fn test_block_indexed_once() {
        let (_dir, indexer) = open_indexer();
        let txs = vec![legacy_tx(3, 0, false, 21_000, 1, 21_000)];
        let block = block_for(3, &txs);
        indexer.index_block(&block, &txs).unwrap();

        assert!(matches!(
            indexer.index_block(&block, &txs),
            Err(IndexerError::AlreadyIndexed(3))
        ));
    }

    #[test]
    fn test_last_block_only_moves_forward() {
        let (_dir, indexer) = open_indexer();
        indexer.index_block(&block_for(8, &[]), &[]).unwrap();
        indexer.index_block(&block_for(5, &[]), &[]).unwrap();
        assert_eq!(indexer.last_indexed_block().unwrap(), Some(8));
    }

    #[test]
    fn test_rejects_inconsistent_block() {
        let (_dir, indexer) = open_indexer();
        let txs = vec![legacy_tx(4, 0, false, 21_000, 1, 21_000)];

        let mut block = block_for(4, &txs);
        block.transactions.push(tx_hash(4, 9));
        assert!(matches!(
            indexer.index_block(&block, &txs),
            Err(IndexerError::TransactionCountMismatch { expected: 2, actual: 1, .. })
        ));

        // Transaction recorded at another height
        let block = block_for(5, &txs);
        let mut wrong = txs.clone();
        wrong[0].block_hash = block.hash;
        assert!(matches!(
            indexer.index_block(&block, &wrong),
            Err(IndexerError::InconsistentTransaction { .. })
        ));

        // Nothing was written
        assert!(indexer.get_by_hash(&tx_hash(4, 0)).unwrap().is_none());
        assert_eq!(indexer.last_indexed_block().unwrap(), None);
    }

    #[test]
    fn test_rejects_wrong_eth_index() {
        let (_dir, indexer) = open_indexer();
        let mut txs = vec![legacy_tx(6, 0, false, 21_000, 1, 21_000)];
        txs[0].tx_result.eth_tx_index = 4;
        let block = block_for(6, &txs);
        assert!(matches!(
            indexer.index_block(&block, &txs),
            Err(IndexerError::InconsistentTransaction { .. })
        ));
    }

    #[test]
    fn test_reused_hash_does_not_rewrite_earlier_block() {
        let (_dir, indexer) = open_indexer();
        let first = vec![legacy_tx(5, 0, true, 21_000, 3, 40_000)];
        indexer.index_block(&block_for(5, &first), &first).unwrap();

        // Same hash claimed by a later block
        let mut reused = legacy_tx(6, 0, false, 50_000, 3, 40_000);
        reused.transaction.hash = tx_hash(5, 0);
        let block = block_for(6, std::slice::from_ref(&reused));
        assert!(matches!(
            indexer.index_block(&block, std::slice::from_ref(&reused)),
            Err(IndexerError::DuplicateTransaction(h)) if h == tx_hash(5, 0)
        ));

        let stored = indexer.get_by_hash(&tx_hash(5, 0)).unwrap().unwrap();
        assert_eq!(stored.tx_result.height, 5);
        assert!(stored.tx_result.failed);
        assert_eq!(stored.tx_result.gas_used, 21_000);
        assert!(indexer.get_block(6).unwrap().is_none());
        assert_eq!(indexer.last_indexed_block().unwrap(), Some(5));
    }

    #[test]
    fn test_rejects_hash_listed_twice_in_block() {
        let (_dir, indexer) = open_indexer();
        let tx = legacy_tx(9, 0, false, 21_000, 1, 21_000);
        let mut second = legacy_tx(9, 1, true, 30_000, 1, 60_000);
        second.transaction.hash = tx.hash();
        let txs = vec![tx, second];

        assert!(matches!(
            indexer.index_block(&block_for(9, &txs), &txs),
            Err(IndexerError::DuplicateTransaction(_))
        ));
        assert!(indexer.get_by_hash(&tx_hash(9, 0)).unwrap().is_none());
    }

    #[test]
    fn test_block_by_hash() {
        let (_dir, indexer) = open_indexer();
        let txs = vec![legacy_tx(11, 0, false, 21_000, 1, 21_000)];
        let block = block_for(11, &txs);
        indexer.index_block(&block, &txs).unwrap();

        assert_eq!(indexer.get_block_by_hash(&block_hash(11)).unwrap(), Some(block.clone()));
        assert!(indexer.get_block_by_hash(&block_hash(12)).unwrap().is_none());

        // Another height cannot reuse the hash
        let mut other = block_for(12, &[]);
        other.hash = block.hash;
        assert!(matches!(
            indexer.index_block(&other, &[]),
            Err(IndexerError::DuplicateBlockHash(_))
        ));
    }

    #[test]
    fn test_concurrent_writers_index_block_once() {
        let (_dir, indexer) = open_indexer();
        let txs = vec![legacy_tx(20, 0, false, 21_000, 1, 21_000)];
        let block = block_for(20, &txs);

        let writers: Vec<_> = (0..8)
            .map(|_| {
                let indexer = indexer.clone();
                let block = block.clone();
                let txs = txs.clone();
                std::thread::spawn(move || indexer.index_block(&block, &txs).is_ok())
            })
            .collect();
        let succeeded = writers
            .into_iter()
            .map(|w| w.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(succeeded, 1);
        assert_eq!(indexer.last_indexed_block().unwrap(), Some(20));
    }
}
