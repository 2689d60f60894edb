//! Temple Configuration

use serde::{Deserialize, Serialize};

use crate::errors::{TempleError, TempleResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempleConfig {
    /// How long a market cap must hold above a threshold
    pub hold_duration_secs: u64,
    /// Commit attempts before a conflicting update is surfaced
    pub max_commit_attempts: u32,
}

impl Default for TempleConfig {
    fn default() -> Self {
        Self {
            hold_duration_secs: 30 * 60,
            max_commit_attempts: 8,
        }
    }
}

impl TempleConfig {
    pub fn validate(&self) -> TempleResult<()> {
        if self.hold_duration_secs == 0 {
            return Err(TempleError::InvalidConfig(
                "hold_duration_secs must be positive".into(),
            ));
        }
        if self.max_commit_attempts == 0 {
            return Err(TempleError::InvalidConfig(
                "max_commit_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn hold_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.hold_duration_secs as i64)
    }
}
