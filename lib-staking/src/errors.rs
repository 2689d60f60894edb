//! Staking Errors

use chrono::{DateTime, Utc};
use thiserror::Error;

use lib_ledger::LedgerError;
use lib_types::Amount;

/// Error during staking operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StakingError {
    #[error("Stake below minimum: min {min}, got {got}")]
    BelowMinimum { min: Amount, got: Amount },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient stake: available {available}, requested {requested}")]
    InsufficientStake { available: Amount, requested: Amount },

    #[error("A withdrawal is already pending")]
    WithdrawalAlreadyPending,

    #[error("No pending withdrawal")]
    NoPendingWithdrawal,

    #[error("Invalid withdrawal type: expected {expected}, found {found}")]
    InvalidType {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Withdrawal not yet available, available at {available_at}")]
    NotYetAvailable { available_at: DateTime<Utc> },

    #[error("No rewards available")]
    NoRewardsAvailable,

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Gave up after {attempts} conflicting commits")]
    Conflict { attempts: u32 },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl StakingError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StakingError::Ledger(e) if e.is_conflict())
    }
}

/// Result type for staking operations
pub type StakingResult<T> = Result<T, StakingError>;
