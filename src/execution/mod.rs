// Execution - Accounting rules applied to recorded execution results
// Principle: Same inputs, same reported values, forever

pub mod gas;

pub use gas::{legacy_gas_used, CutoverHeight, GasAccountingConfig, GasUsageResolver};
