// Filters - Log criteria and installed polling filters
//
// Installed filters live in memory only and are dropped when not polled
// for FILTER_TIMEOUT.
use crate::rpc::types::{parse_quantity, BlockTag};
use crate::types::{to_quantity, Address, BlockNumber, Hash, Log};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Filters not polled for this long are removed
pub const FILTER_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Maximum number of installed filters
pub const MAX_FILTERS: usize = 200;

/// Widest block range a single log query may scan
pub const MAX_BLOCK_RANGE: u64 = 10_000;

// =============================================================================
// LOG CRITERIA
// =============================================================================

/// Criteria of eth_getLogs and eth_newFilter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFilter {
    pub from_block: Option<BlockTag>,
    pub to_block: Option<BlockTag>,
    /// Restricts the query to a single block, exclusive with the range
    pub block_hash: Option<Hash>,
    /// Empty matches any emitter
    pub addresses: Vec<Address>,
    /// Positional topic sets; `None` or an empty set matches any topic
    pub topics: Vec<Option<Vec<Hash>>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilterObject {
    from_block: Option<String>,
    to_block: Option<String>,
    block_hash: Option<Hash>,
    address: Option<OneOrMany<Address>>,
    topics: Option<Vec<Option<OneOrMany<Hash>>>>,
}

impl LogFilter {
    /// Parse the filter object of `[filter]` params
    pub fn from_params(params: &serde_json::Value) -> Result<Self, String> {
        let object = match params {
            serde_json::Value::Array(arr) if !arr.is_empty() => arr[0].clone(),
            _ => return Err("Expected [filter]".to_string()),
        };
        let raw: FilterObject =
            serde_json::from_value(object).map_err(|e| format!("Invalid filter: {}", e))?;

        if raw.block_hash.is_some() && (raw.from_block.is_some() || raw.to_block.is_some()) {
            return Err("blockHash cannot be combined with fromBlock/toBlock".to_string());
        }

        Ok(Self {
            from_block: raw.from_block.as_deref().map(BlockTag::parse).transpose()?,
            to_block: raw.to_block.as_deref().map(BlockTag::parse).transpose()?,
            block_hash: raw.block_hash,
            addresses: raw.address.map(OneOrMany::into_vec).unwrap_or_default(),
            topics: raw
                .topics
                .unwrap_or_default()
                .into_iter()
                .map(|t| t.map(OneOrMany::into_vec))
                .collect(),
        })
    }

    pub fn matches(&self, log: &Log) -> bool {
        if !self.addresses.is_empty() && !self.addresses.contains(&log.address) {
            return false;
        }
        if self.topics.len() > log.topics.len() {
            return false;
        }
        self.topics
            .iter()
            .zip(&log.topics)
            .all(|(wanted, topic)| match wanted {
                Some(set) if !set.is_empty() => set.contains(topic),
                _ => true,
            })
    }

    /// Blocks covered by the criteria, both bounds defaulting to `latest`.
    /// `None` when the range is empty.
    pub fn block_range(&self, latest: BlockNumber) -> Option<(BlockNumber, BlockNumber)> {
        let from = self.from_block.unwrap_or(BlockTag::Latest).resolve(latest);
        let to = self
            .to_block
            .unwrap_or(BlockTag::Latest)
            .resolve(latest)
            .min(latest);
        (from <= to).then_some((from, to))
    }
}

/// Reject ranges wider than [`MAX_BLOCK_RANGE`]
pub fn check_range(from: BlockNumber, to: BlockNumber) -> Result<(), String> {
    if to - from >= MAX_BLOCK_RANGE {
        return Err(format!(
            "block range {}..{} exceeds {} blocks",
            from, to, MAX_BLOCK_RANGE
        ));
    }
    Ok(())
}

// =============================================================================
// INSTALLED FILTERS
// =============================================================================

/// What an installed filter reports
#[derive(Debug, Clone, PartialEq)]
pub enum FilterKind {
    /// Hashes of new blocks
    Blocks,
    /// Logs matching the criteria
    Logs(LogFilter),
}

#[derive(Debug, Clone)]
struct InstalledFilter {
    kind: FilterKind,
    /// Highest block already reported
    last_polled: BlockNumber,
    last_access: Instant,
}

/// Blocks not yet reported by a filter
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPoll {
    pub kind: FilterKind,
    /// `None` when no block was added since the previous poll
    pub unseen: Option<(BlockNumber, BlockNumber)>,
}

/// Thread-safe registry of polling filters
#[derive(Clone)]
pub struct FilterManager {
    filters: Arc<RwLock<HashMap<u64, InstalledFilter>>>,
    next_id: Arc<AtomicU64>,
    timeout: Duration,
}

impl FilterManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            filters: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            timeout,
        }
    }

    /// Install a filter, returning its id as a quantity string.
    /// Only blocks after `latest` are reported as changes.
    pub async fn install(&self, kind: FilterKind, latest: BlockNumber) -> Result<String, String> {
        self.cleanup().await;

        let mut filters = self.filters.write().await;
        if filters.len() >= MAX_FILTERS {
            return Err(format!("too many filters installed (max {})", MAX_FILTERS));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        filters.insert(
            id,
            InstalledFilter {
                kind,
                last_polled: latest,
                last_access: Instant::now(),
            },
        );
        debug!("Installed filter {} at block {}", id, latest);
        Ok(to_quantity(id))
    }

    /// `false` if the id was unknown
    pub async fn uninstall(&self, id: &str) -> bool {
        let Ok(id) = parse_quantity(id) else {
            return false;
        };
        self.filters.write().await.remove(&id).is_some()
    }

    /// Take the blocks added since the last poll, up to `latest`
    pub async fn poll(&self, id: &str, latest: BlockNumber) -> Option<FilterPoll> {
        let id = parse_quantity(id).ok()?;
        let mut filters = self.filters.write().await;
        let filter = filters.get_mut(&id)?;

        filter.last_access = Instant::now();
        let unseen = (filter.last_polled < latest).then(|| (filter.last_polled + 1, latest));
        filter.last_polled = filter.last_polled.max(latest);

        Some(FilterPoll {
            kind: filter.kind.clone(),
            unseen,
        })
    }

    /// Criteria of a filter without consuming its changes
    pub async fn get(&self, id: &str) -> Option<FilterKind> {
        let id = parse_quantity(id).ok()?;
        let mut filters = self.filters.write().await;
        let filter = filters.get_mut(&id)?;
        filter.last_access = Instant::now();
        Some(filter.kind.clone())
    }

    /// Drop filters not polled within the timeout
    pub async fn cleanup(&self) {
        let mut filters = self.filters.write().await;
        let now = Instant::now();
        let before = filters.len();
        filters.retain(|_, f| now.duration_since(f.last_access) < self.timeout);
        if filters.len() < before {
            debug!("Removed {} expired filters", before - filters.len());
        }
    }
}

impl Default for FilterManager {
    fn default() -> Self {
        Self::new(FILTER_TIMEOUT)
    }
}
