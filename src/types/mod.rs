// Types - Ledger data read by the RPC layer
// Principle: Immutable records, the RPC layer never rewrites history

pub mod primitives;
pub mod transaction;
pub mod tx_result;

pub use primitives::*;
pub use transaction::*;
pub use tx_result::*;
