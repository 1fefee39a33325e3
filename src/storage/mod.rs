// Storage - Index des transactions exécutées (RocksDB)
// Principe: Écrit une fois, relu à l'identique

pub mod db;
pub mod import;
pub mod indexer;

pub use db::{Database, DatabaseError, DbBatch};
pub use import::{import_blocks, ExportedBlock, ImportError, ImportStats};
pub use indexer::{IndexedBlock, IndexedTransaction, IndexerError, KvIndexer, TxResultStore};
