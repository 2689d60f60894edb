//! Token Launchpad
//!
//! Wires the ledger, the bonding curve market, protocol staking and the
//! Temple achievement program behind one facade, [`Launchpad`].
//!
//! Every mutating operation takes a [`Caller`](lib_types::Caller); anonymous
//! callers are rejected before any engine is touched.

pub mod config;
pub mod errors;
pub mod launchpad;
pub mod logging;
pub mod sweeper;

pub use config::{LaunchpadConfig, StorageConfig};
pub use errors::{ErrorKind, LaunchpadError, LaunchpadResult};
pub use launchpad::{Launchpad, SweepReport};
pub use logging::init_tracing;
pub use sweeper::{spawn_sweeper, SweeperService};

pub use lib_ledger as ledger;
pub use lib_market as market;
pub use lib_staking as staking;
pub use lib_temple as temple;
pub use lib_types as types;
