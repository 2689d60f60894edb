//! Market and Graduation Errors

use thiserror::Error;

use lib_ledger::LedgerError;
use lib_types::{Amount, TokenId};

/// Error during bonding curve operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Market closed: token {0} has graduated")]
    MarketClosed(TokenId),

    #[error("Wallet limit exceeded: limit {limit}, would have {would_have}")]
    WalletLimitExceeded { limit: Amount, would_have: Amount },

    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: Amount, need: Amount },

    #[error("Token amount too small")]
    AmountTooSmall,

    #[error("Token not found: {0}")]
    TokenNotFound(TokenId),

    #[error("Gave up after {attempts} conflicting commits")]
    Conflict { attempts: u32 },

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for MarketError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::TokenNotFound(id) => MarketError::TokenNotFound(id),
            LedgerError::InsufficientBalance { have, need } => {
                MarketError::InsufficientBalance { have, need }
            }
            LedgerError::BalanceCapExceeded { cap, would_have } => {
                MarketError::WalletLimitExceeded {
                    limit: cap,
                    would_have,
                }
            }
            other => MarketError::Ledger(other),
        }
    }
}

impl MarketError {
    /// Optimistic version mismatch that a fresh attempt may resolve
    pub fn is_conflict(&self) -> bool {
        matches!(self, MarketError::Ledger(e) if e.is_conflict())
    }
}

/// Result type for market operations
pub type MarketResult<T> = Result<T, MarketError>;

/// Error during graduation distribution
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraduationError {
    #[error("Token {0} has not graduated")]
    NotGraduated(TokenId),

    #[error("Token not found: {0}")]
    TokenNotFound(TokenId),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Result type for graduation operations
pub type GraduationResult<T> = Result<T, GraduationError>;

#[cfg(test)]
mod tests {
    use super::*;
    use lib_ledger::Entity;

    #[test]
    fn test_ledger_errors_map_to_market_errors() {
        let cap = LedgerError::BalanceCapExceeded {
            cap: 10.0,
            would_have: 11.0,
        };
        assert!(matches!(
            MarketError::from(cap),
            MarketError::WalletLimitExceeded { .. }
        ));

        let conflict = MarketError::from(LedgerError::VersionConflict {
            entity: Entity::Token,
            expected: Some(1),
            found: Some(2),
        });
        assert!(conflict.is_conflict());
        assert!(!MarketError::AmountTooSmall.is_conflict());
    }
}
