//! Temple Errors

use thiserror::Error;

use lib_ledger::LedgerError;
use lib_types::PhaseId;

/// Error during temple operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TempleError {
    #[error("Invalid phase: {0}")]
    InvalidPhase(String),

    #[error("Phase not found: {0}")]
    PhaseNotFound(PhaseId),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Gave up after {attempts} conflicting commits")]
    Conflict { attempts: u32 },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl TempleError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, TempleError::Ledger(e) if e.is_conflict())
    }
}

/// Result type for temple operations
pub type TempleResult<T> = Result<T, TempleError>;
