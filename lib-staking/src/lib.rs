//! Protocol Staking
//!
//! Users stake into the single protocol pool, which is fed by trade fees.
//! Stakers earn a pro-rata share of those fees and an airdrop of every token
//! that graduates while they are staked.

pub mod config;
pub mod errors;
pub mod ledger;
pub mod rewards;

pub use config::StakingConfig;
pub use errors::{StakingError, StakingResult};
pub use ledger::{InstantWithdrawal, PoolStats, StakingLedger};
pub use rewards::{RewardAccrual, RewardSummary, TokenRewardShare};
