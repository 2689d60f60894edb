//! Market Configuration
//!
//! Curve, fee and graduation parameters. Fixed at deployment.

use serde::{Deserialize, Serialize};

use lib_types::Amount;

use crate::errors::{MarketError, MarketResult};

/// Configuration for the bonding curve market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    // =========================================================================
    // Fees
    // =========================================================================
    /// Protocol fee on every trade (0.002 = 0.2%)
    pub trade_fee_rate: f64,

    // =========================================================================
    // Curve
    // =========================================================================
    /// Virtual SOL reserve of a freshly launched token
    pub initial_virtual_sol: Amount,
    /// Virtual token reserve of a freshly launched token
    pub initial_virtual_tokens: Amount,
    /// Total supply of every launched token
    pub total_supply: Amount,
    /// Simulated SOL price used for market cap (USD)
    pub sol_price_usd: f64,

    // =========================================================================
    // Graduation
    // =========================================================================
    /// SOL added to the curve at which progress reaches 100%
    pub graduation_sol_target: Amount,
    /// Share of total supply airdropped to stakers on graduation
    pub graduation_airdrop_rate: f64,

    // =========================================================================
    // Concurrency
    // =========================================================================
    /// Commit attempts before a conflicting trade is surfaced
    pub max_commit_attempts: u32,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            trade_fee_rate: 0.002,

            initial_virtual_sol: 30.0,
            initial_virtual_tokens: 1_000_000_000.0,
            total_supply: 1_000_000_000.0,
            sol_price_usd: 200.0,

            graduation_sol_target: 85.0,
            graduation_airdrop_rate: 0.05,

            max_commit_attempts: 8,
        }
    }
}

impl MarketConfig {
    /// Small curve that graduates after a few SOL
    pub fn for_testing() -> Self {
        Self {
            graduation_sol_target: 5.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> MarketResult<()> {
        let invalid = |msg: &str| Err(MarketError::InvalidParameters(msg.to_string()));

        if !(0.0..1.0).contains(&self.trade_fee_rate) {
            return invalid("trade_fee_rate must be in [0, 1)");
        }
        if !(self.initial_virtual_sol > 0.0) || !(self.initial_virtual_tokens > 0.0) {
            return invalid("initial virtual reserves must be positive");
        }
        if !(self.total_supply > 0.0) {
            return invalid("total_supply must be positive");
        }
        if !(self.graduation_sol_target > 0.0) {
            return invalid("graduation_sol_target must be positive");
        }
        if !(0.0..=1.0).contains(&self.graduation_airdrop_rate) {
            return invalid("graduation_airdrop_rate must be in [0, 1]");
        }
        if !(self.sol_price_usd >= 0.0) {
            return invalid("sol_price_usd must not be negative");
        }
        if self.max_commit_attempts == 0 {
            return invalid("max_commit_attempts must be at least 1");
        }
        Ok(())
    }

    /// Graduation progress for a virtual SOL reserve, clamped to 0..=100
    pub fn progress(&self, virtual_sol_reserves: Amount) -> f64 {
        let added = virtual_sol_reserves - self.initial_virtual_sol;
        (added / self.graduation_sol_target * 100.0).clamp(0.0, 100.0)
    }

    /// Simulated market cap in USD
    pub fn market_cap(&self, virtual_sol_reserves: Amount) -> Amount {
        virtual_sol_reserves * self.sol_price_usd
    }

    /// Tokens reserved for stakers at launch and airdropped on graduation
    pub fn staker_allocation(&self) -> Amount {
        self.total_supply * self.graduation_airdrop_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = MarketConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.staker_allocation(), 50_000_000.0);
        assert_eq!(config.market_cap(30.0), 6_000.0);
    }

    #[test]
    fn test_progress_is_clamped() {
        let config = MarketConfig::default();
        assert_eq!(config.progress(30.0), 0.0);
        assert_eq!(config.progress(20.0), 0.0);
        assert!((config.progress(72.5) - 50.0).abs() < 1e-9);
        assert_eq!(config.progress(115.0), 100.0);
        assert_eq!(config.progress(500.0), 100.0);
    }

    #[test]
    fn test_rejects_bad_fee() {
        let config = MarketConfig {
            trade_fee_rate: 1.5,
            ..MarketConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MarketError::InvalidParameters(_))
        ));
    }
}
