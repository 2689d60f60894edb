//! Ledger Errors

use thiserror::Error;
use lib_types::{Amount, PhaseId, TokenId, UserId};

/// Record kinds that take part in optimistic concurrency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Token,
    UserStake,
    Achievement,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Token => write!(f, "token"),
            Entity::UserStake => write!(f, "user_stake"),
            Entity::Achievement => write!(f, "achievement"),
        }
    }
}

/// Error during ledger operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Token not found: {0}")]
    TokenNotFound(TokenId),

    #[error("Token already exists: {0}")]
    TokenExists(TokenId),

    #[error("Phase not found: {0}")]
    PhaseNotFound(PhaseId),

    #[error("Phase number {0} already exists")]
    PhaseExists(u32),

    #[error("Tier {tier} not configured in phase {phase}")]
    TierNotFound { phase: PhaseId, tier: u8 },

    #[error("Graduation record not found for token {0}")]
    GraduationNotFound(TokenId),

    #[error("No airdrop allocation for user {user} on token {token}")]
    AllocationNotFound { token: TokenId, user: UserId },

    #[error("Version conflict on {entity}: expected {expected:?}, found {found:?}")]
    VersionConflict {
        entity: Entity,
        expected: Option<u64>,
        found: Option<u64>,
    },

    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: Amount, need: Amount },

    #[error("Balance cap exceeded: cap {cap}, would have {would_have}")]
    BalanceCapExceeded { cap: Amount, would_have: Amount },

    #[error("Staked total would become negative: have {have}, delta {delta}")]
    NegativeStake { have: Amount, delta: Amount },

    #[error("All {max_spots} spots of tier {tier} are taken")]
    SpotsExhausted { tier: u8, max_spots: u32 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Whether retrying the same unit of work on fresh state may succeed
    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::VersionConflict { .. })
    }
}

impl From<sled::Error> for LedgerError {
    fn from(e: sled::Error) -> Self {
        LedgerError::Storage(e.to_string())
    }
}

impl From<bincode::Error> for LedgerError {
    fn from(e: bincode::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
