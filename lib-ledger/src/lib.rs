//! Launchpad Ledger Store
//!
//! Persistent records for tokens, balances, trades, the staking pool, user
//! stakes, graduations and Temple phases/achievements, plus the atomic
//! unit-of-work primitives every engine commits through.
//!
//! Two backends share the same semantics:
//! - [`MemoryLedger`] - process memory behind a single `RwLock`
//! - [`SledLedger`] - one sled tree, bincode values, sled transactions

pub mod errors;
pub mod keys;
pub mod memory;
pub mod records;
pub mod sled_store;
pub mod store;

pub use errors::{Entity, LedgerError, LedgerResult};
pub use memory::MemoryLedger;
pub use records::{
    AchievementKey, AchievementState, AirdropAllocation, Balance, GraduationRecord,
    HolderSnapshot, PendingWithdrawal, StakingPool, TempleAchievement, TemplePhase, TierReward,
    Token, TokenAirdrop, TokenReward, Trade, TradeSide, UserStake,
};
pub use sled_store::SledLedger;
pub use store::{LedgerStore, StakeCommit, TradeCommit};
