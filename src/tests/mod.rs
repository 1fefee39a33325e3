// Tests module
// Gas reporting: receipts across the revert refund fix height, determinism under concurrency
