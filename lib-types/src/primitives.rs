//! Canonical Primitive Types for the Launchpad Ledger
//!
//! These types are the foundational building blocks for every ledger record.
//! They are designed to be:
//! - Fixed-size (no dynamic allocation)
//! - Deterministically serializable
//! - Cheap to copy and compare

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// TYPE ALIASES
// ============================================================================

/// SOL and token quantities.
///
/// Virtual reserves are simulated liquidity priced with floating point; all
/// invariants on amounts are checked within [`AMOUNT_EPSILON`].
pub type Amount = f64;

/// Tolerance used when comparing amounts produced by curve arithmetic
pub const AMOUNT_EPSILON: Amount = 1e-9;

// ============================================================================
// IDENTIFIER TYPES
// ============================================================================

macro_rules! ledger_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the underlying UUID
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let simple = self.0.simple().to_string();
                write!(f, "{}({})", stringify!($name), &simple[..8])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

ledger_id!(
    /// Account identifier of a platform user
    UserId
);

ledger_id!(
    /// Identifier of a launched bonding-curve token
    TokenId
);

ledger_id!(
    /// Identifier of a Temple phase
    PhaseId
);

ledger_id!(
    /// Identifier of an immutable trade record
    TradeId
);
