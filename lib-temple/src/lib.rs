//! Temple of Moon
//!
//! A tiered achievement program run in time-boxed phases. A token wins a
//! tier by holding its market cap above the tier threshold for the hold
//! duration, while spots on that tier remain.

pub mod config;
pub mod engine;
pub mod errors;
pub mod phase;

pub use config::TempleConfig;
pub use engine::{TempleAchievementEngine, TierEvaluation, TierOutcome};
pub use errors::{TempleError, TempleResult};
pub use phase::{PhaseRequest, PhaseStatus, TierRequest, TierStatus};
