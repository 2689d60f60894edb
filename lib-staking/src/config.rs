//! Staking Configuration

use serde::{Deserialize, Serialize};

use lib_types::Amount;

use crate::errors::{StakingError, StakingResult};

/// Configuration for staking and withdrawals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StakingConfig {
    /// Smallest accepted deposit
    pub min_stake: Amount,
    /// Penalty on instant withdrawals (0.05 = 5%)
    pub instant_withdrawal_fee_rate: f64,
    /// Delay before a standard withdrawal can complete
    pub standard_withdrawal_delay_secs: u64,
    /// Commit attempts before a conflicting update is surfaced
    pub max_commit_attempts: u32,
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            min_stake: 1_000_000.0,
            instant_withdrawal_fee_rate: 0.05,
            standard_withdrawal_delay_secs: 5 * 24 * 60 * 60, // 5 days
            max_commit_attempts: 8,
        }
    }
}

impl StakingConfig {
    pub fn validate(&self) -> StakingResult<()> {
        if !(self.min_stake >= 0.0) {
            return Err(StakingError::InvalidConfig("min_stake must not be negative".into()));
        }
        if !(0.0..1.0).contains(&self.instant_withdrawal_fee_rate) {
            return Err(StakingError::InvalidConfig(
                "instant_withdrawal_fee_rate must be in [0, 1)".into(),
            ));
        }
        if self.max_commit_attempts == 0 {
            return Err(StakingError::InvalidConfig(
                "max_commit_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn standard_withdrawal_delay(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.standard_withdrawal_delay_secs as i64)
    }
}
