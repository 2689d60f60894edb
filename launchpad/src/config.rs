//! Launchpad Configuration
//!
//! One TOML document with a table per engine. Every field is optional; a
//! missing field takes the reference value.
//!
//! ```toml
//! sweep_interval_secs = 30
//! log_level = "debug"
//!
//! [storage]
//! backend = "sled"
//! path = "/var/lib/launchpad/ledger"
//!
//! [market]
//! trade_fee_rate = 0.002
//!
//! [temple]
//! hold_duration_secs = 1800
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use lib_ledger::{LedgerStore, MemoryLedger, SledLedger};
use lib_market::MarketConfig;
use lib_staking::StakingConfig;
use lib_temple::TempleConfig;

/// Where the ledger lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Process memory, lost on exit
    Memory,
    /// sled database directory
    Sled { path: PathBuf },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory
    }
}

impl StorageConfig {
    pub fn open(&self) -> Result<Arc<dyn LedgerStore>> {
        Ok(match self {
            StorageConfig::Memory => Arc::new(MemoryLedger::new()),
            StorageConfig::Sled { path } => Arc::new(
                SledLedger::open(path)
                    .with_context(|| format!("opening ledger at {}", path.display()))?,
            ),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchpadConfig {
    pub market: MarketConfig,
    pub staking: StakingConfig,
    pub temple: TempleConfig,
    pub storage: StorageConfig,

    /// Period of the temple timer and graduation resume sweep
    pub sweep_interval_secs: u64,
    /// Default tracing filter, overridden by `RUST_LOG`
    pub log_level: String,
}

impl Default for LaunchpadConfig {
    fn default() -> Self {
        Self {
            market: MarketConfig::default(),
            staking: StakingConfig::default(),
            temple: TempleConfig::default(),
            storage: StorageConfig::default(),
            sweep_interval_secs: 60,
            log_level: "info".to_string(),
        }
    }
}

impl LaunchpadConfig {
    /// Reference configuration on in-memory storage with a fast sweep
    pub fn for_testing() -> Self {
        Self {
            market: MarketConfig::for_testing(),
            sweep_interval_secs: 1,
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("parsing launchpad config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        self.market.validate()?;
        self.staking.validate()?;
        self.temple.validate()?;
        if self.sweep_interval_secs == 0 {
            bail!("sweep_interval_secs must be positive");
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
