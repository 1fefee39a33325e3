// Gas - Reported gas usage for executed transactions
//
// Reverted transactions executed before the refund fix were reported with
// `gas_price * gas_limit` as their gas used. That value was already served to
// clients, so it is reproduced for every block below the fix height.
use crate::types::{BlockNumber, Gas, TxResult};
use num_bigint::BigUint;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Source of the height from which reverted transactions report their real gas used
pub trait CutoverHeight: Send + Sync {
    fn fix_revert_gas_refund_height(&self) -> BlockNumber;
}

/// Fixed cutover, mostly useful for tests and one-off tools
impl CutoverHeight for BlockNumber {
    fn fix_revert_gas_refund_height(&self) -> BlockNumber {
        *self
    }
}

impl<T: CutoverHeight + ?Sized> CutoverHeight for Arc<T> {
    fn fix_revert_gas_refund_height(&self) -> BlockNumber {
        (**self).fix_revert_gas_refund_height()
    }
}

/// Process-wide gas accounting settings.
///
/// Cloning shares the underlying value: a reload through one handle is seen by
/// every resolver built from a clone.
#[derive(Debug, Clone, Default)]
pub struct GasAccountingConfig {
    fix_revert_gas_refund_height: Arc<AtomicU64>,
}

impl GasAccountingConfig {
    pub fn new(fix_revert_gas_refund_height: BlockNumber) -> Self {
        Self {
            fix_revert_gas_refund_height: Arc::new(AtomicU64::new(fix_revert_gas_refund_height)),
        }
    }

    /// Replace the cutover height (startup or config reload)
    pub fn set_fix_revert_gas_refund_height(&self, height: BlockNumber) {
        self.fix_revert_gas_refund_height
            .store(height, Ordering::Release);
    }
}

impl CutoverHeight for GasAccountingConfig {
    fn fix_revert_gas_refund_height(&self) -> BlockNumber {
        self.fix_revert_gas_refund_height.load(Ordering::Acquire)
    }
}

/// Computes the gas used value exposed over RPC
#[derive(Debug, Clone)]
pub struct GasUsageResolver<H = GasAccountingConfig> {
    cutover: H,
}

impl<H: CutoverHeight> GasUsageResolver<H> {
    pub fn new(cutover: H) -> Self {
        Self { cutover }
    }

    /// Gas used to report for `tx_result`.
    ///
    /// Successful transactions always report their recorded gas. Failed ones
    /// below the cutover height report `gas_price * gas_limit`, truncated to
    /// the low 64 bits; at or above it they report their recorded gas.
    pub fn resolve(&self, tx_result: &TxResult, gas_price: &BigUint, gas_limit: Gas) -> Gas {
        if !tx_result.failed {
            return tx_result.gas_used;
        }

        let cutover = self.cutover.fix_revert_gas_refund_height();
        if tx_result.height < cutover {
            let gas_used = legacy_gas_used(gas_price, gas_limit);
            debug!(
                "Legacy revert gas accounting at height {} (fix at {}): {}",
                tx_result.height, cutover, gas_used
            );
            return gas_used;
        }

        tx_result.gas_used
    }
}

/// `gas_price * gas_limit` modulo 2^64
pub fn legacy_gas_used(gas_price: &BigUint, gas_limit: Gas) -> Gas {
    let product = gas_price * BigUint::from(gas_limit);
    product.iter_u64_digits().next().unwrap_or(0)
}
