//! Launchpad primitives.
//! Stable, storage-neutral, behavior-free.
//!
//! Rule: every record in the ledger is keyed by one of the identifier types
//! defined here, never by a bare string.

pub mod primitives;
pub mod clock;
pub mod auth;

pub use primitives::{Amount, PhaseId, TokenId, TradeId, UserId, AMOUNT_EPSILON};
pub use clock::{Clock, ManualClock, SystemClock};
pub use auth::{AuthenticatedUser, Caller, Unauthorized};
