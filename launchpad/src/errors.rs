//! Launchpad Errors
//!
//! Every engine error surfaces through [`LaunchpadError`], and
//! [`LaunchpadError::kind`] sorts it into the class a caller acts on:
//!
//! - **Validation**: bad input, nothing was written
//! - **StateConflict**: the request does not fit the current state
//! - **Concurrency**: lost a race too many times, safe to retry
//! - **Integrity**: the store failed; multi-record work resumes on the next sweep

use serde::{Deserialize, Serialize};
use thiserror::Error;

use lib_ledger::LedgerError;
use lib_market::{GraduationError, MarketError};
use lib_staking::StakingError;
use lib_temple::TempleError;
use lib_types::Unauthorized;

/// Caller-facing error class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    StateConflict,
    Concurrency,
    Integrity,
    Unauthorized,
    NotFound,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LaunchpadError {
    #[error(transparent)]
    Unauthorized(#[from] Unauthorized),

    #[error("Market: {0}")]
    Market(#[from] MarketError),

    #[error("Graduation: {0}")]
    Graduation(#[from] GraduationError),

    #[error("Staking: {0}")]
    Staking(#[from] StakingError),

    #[error("Temple: {0}")]
    Temple(#[from] TempleError),

    #[error("Ledger: {0}")]
    Ledger(#[from] LedgerError),
}

fn ledger_kind(e: &LedgerError) -> ErrorKind {
    match e {
        LedgerError::TokenNotFound(_)
        | LedgerError::PhaseNotFound(_)
        | LedgerError::TierNotFound { .. }
        | LedgerError::GraduationNotFound(_)
        | LedgerError::AllocationNotFound { .. } => ErrorKind::NotFound,
        LedgerError::PhaseExists(_) => ErrorKind::Validation,
        LedgerError::VersionConflict { .. } | LedgerError::SpotsExhausted { .. } => {
            ErrorKind::Concurrency
        }
        LedgerError::InsufficientBalance { .. }
        | LedgerError::BalanceCapExceeded { .. }
        | LedgerError::NegativeStake { .. } => ErrorKind::StateConflict,
        LedgerError::TokenExists(_) | LedgerError::Serialization(_) | LedgerError::Storage(_) => {
            ErrorKind::Integrity
        }
    }
}

impl LaunchpadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LaunchpadError::Unauthorized(_) => ErrorKind::Unauthorized,
            LaunchpadError::Market(e) => match e {
                MarketError::InvalidAmount(_)
                | MarketError::InvalidParameters(_)
                | MarketError::AmountTooSmall => ErrorKind::Validation,
                MarketError::MarketClosed(_)
                | MarketError::WalletLimitExceeded { .. }
                | MarketError::InsufficientBalance { .. } => ErrorKind::StateConflict,
                MarketError::TokenNotFound(_) => ErrorKind::NotFound,
                MarketError::Conflict { .. } => ErrorKind::Concurrency,
                MarketError::Ledger(e) => ledger_kind(e),
            },
            LaunchpadError::Graduation(e) => match e {
                GraduationError::NotGraduated(_) => ErrorKind::StateConflict,
                GraduationError::TokenNotFound(_) => ErrorKind::NotFound,
                GraduationError::Ledger(e) => ledger_kind(e),
            },
            LaunchpadError::Staking(e) => match e {
                StakingError::BelowMinimum { .. }
                | StakingError::InvalidAmount(_)
                | StakingError::InvalidConfig(_) => ErrorKind::Validation,
                StakingError::InsufficientStake { .. }
                | StakingError::WithdrawalAlreadyPending
                | StakingError::NoPendingWithdrawal
                | StakingError::InvalidType { .. }
                | StakingError::NotYetAvailable { .. }
                | StakingError::NoRewardsAvailable => ErrorKind::StateConflict,
                StakingError::Conflict { .. } => ErrorKind::Concurrency,
                StakingError::Ledger(e) => ledger_kind(e),
            },
            LaunchpadError::Temple(e) => match e {
                TempleError::InvalidPhase(_) | TempleError::InvalidConfig(_) => {
                    ErrorKind::Validation
                }
                TempleError::PhaseNotFound(_) => ErrorKind::NotFound,
                TempleError::Conflict { .. } => ErrorKind::Concurrency,
                TempleError::Ledger(e) => ledger_kind(e),
            },
            LaunchpadError::Ledger(e) => ledger_kind(e),
        }
    }
}

/// Result type for launchpad operations
pub type LaunchpadResult<T> = Result<T, LaunchpadError>;
