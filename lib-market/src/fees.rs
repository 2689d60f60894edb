//! Fee Router
//!
//! Every trade pays `gross × trade_fee_rate` to the staking pool. On buys the
//! fee comes off the SOL paid in before it reaches the curve; on sells it
//! comes off the SOL the curve pays out.
//!
//! The router never writes on its own: the fee rides on the trade's
//! [`TradeCommit`] so the pool credit and the reserve update land in the same
//! unit of work.

use serde::{Deserialize, Serialize};

use lib_ledger::TradeCommit;
use lib_types::Amount;

/// Gross amount split into protocol fee and the remainder
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub gross: Amount,
    pub fee: Amount,
    pub net: Amount,
}

/// Extracts the protocol fee and routes it to the staking pool
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeRouter {
    fee_rate: f64,
}

impl FeeRouter {
    pub fn new(fee_rate: f64) -> Self {
        Self { fee_rate }
    }

    pub fn fee_rate(&self) -> f64 {
        self.fee_rate
    }

    /// Split a gross amount; `fee = gross × rate` exactly
    pub fn split(&self, gross: Amount) -> FeeSplit {
        let fee = gross * self.fee_rate;
        FeeSplit {
            gross,
            fee,
            net: gross - fee,
        }
    }

    /// Attach the fee to a pending trade commit
    pub fn route(&self, split: &FeeSplit, commit: &mut TradeCommit) {
        commit.fee = split.fee;
        commit.trade.fee = split.fee;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_reference_rate() {
        let router = FeeRouter::new(0.002);
        let split = router.split(1.0);
        assert_eq!(split.fee, 1.0 * 0.002);
        assert!((split.net - 0.998).abs() < 1e-12);
        assert!((split.fee + split.net - split.gross).abs() < 1e-12);
    }

    #[test]
    fn test_zero_rate_is_free() {
        let split = FeeRouter::new(0.0).split(42.0);
        assert_eq!(split.fee, 0.0);
        assert_eq!(split.net, 42.0);
    }
}
