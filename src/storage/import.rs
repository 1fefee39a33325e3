// Import - Load committed blocks exported by the ledger into the index
use super::indexer::{IndexedBlock, IndexedTransaction, IndexerError, KvIndexer};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// One block and its transactions, as exported by the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedBlock {
    #[serde(flatten)]
    pub block: IndexedBlock,
    #[serde(rename = "transactionResults", default)]
    pub transaction_results: Vec<IndexedTransaction>,
}

/// Summary of an import run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportStats {
    pub blocks: usize,
    pub transactions: usize,
    pub skipped: usize,
}

/// Import a JSON array of exported blocks.
///
/// Blocks already present are skipped, so the same export can be replayed.
pub fn import_blocks<P: AsRef<Path>>(
    indexer: &KvIndexer,
    path: P,
) -> Result<ImportStats, ImportError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| ImportError::Read(format!("{}: {}", path.display(), e)))?;
    let blocks: Vec<ExportedBlock> =
        serde_json::from_str(&content).map_err(|e| ImportError::Parse(e.to_string()))?;

    let mut stats = ImportStats::default();
    for exported in &blocks {
        match indexer.index_block(&exported.block, &exported.transaction_results) {
            Ok(()) => {
                stats.blocks += 1;
                stats.transactions += exported.transaction_results.len();
            }
            Err(IndexerError::AlreadyIndexed(number)) => {
                warn!("Block {} already indexed, skipping", number);
                stats.skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(
        "Imported {} blocks ({} transactions), skipped {}",
        stats.blocks, stats.transactions, stats.skipped
    );
    Ok(stats)
}

/// Import errors
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Failed to read export: {0}")]
    Read(String),

    #[error("Failed to parse export: {0}")]
    Parse(String),

    #[error(transparent)]
    Indexer(#[from] IndexerError),
}
