//! Phase Administration
//!
//! A phase is a time window with a reward budget split across tiers. Every
//! awarded spot pays its tier percentage of the phase budget, so per pool
//! `percentage × max_spots` summed over all tiers may not exceed 100.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lib_ledger::{TemplePhase, TierReward};
use lib_types::{Amount, PhaseId};

use crate::errors::{TempleError, TempleResult};

/// One tier of a new phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierRequest {
    pub tier: u8,
    pub mcap_threshold: Amount,
    pub max_spots: u32,
    pub buffdoge_percentage: f64,
    pub sol_percentage: f64,
}

/// Parameters of a new phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRequest {
    pub phase_number: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    pub total_buffdoge_rewards: Amount,
    pub total_sol_rewards: Amount,
    pub tiers: Vec<TierRequest>,
}

fn invalid(msg: impl Into<String>) -> TempleError {
    TempleError::InvalidPhase(msg.into())
}

fn check_percentage(name: &str, tier: u8, value: f64) -> TempleResult<()> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("tier {}: {} must be within [0, 100]", tier, name)))
    }
}

impl PhaseRequest {
    pub(crate) fn validate(&self) -> TempleResult<()> {
        if self.start_date >= self.end_date {
            return Err(invalid("start_date must be before end_date"));
        }
        for (name, total) in [
            ("total_buffdoge_rewards", self.total_buffdoge_rewards),
            ("total_sol_rewards", self.total_sol_rewards),
        ] {
            if !(total.is_finite() && total >= 0.0) {
                return Err(invalid(format!("{} must not be negative", name)));
            }
        }
        if self.tiers.is_empty() {
            return Err(invalid("a phase needs at least one tier"));
        }

        let mut seen = HashSet::new();
        for tier in &self.tiers {
            if !seen.insert(tier.tier) {
                return Err(invalid(format!("tier {} listed twice", tier.tier)));
            }
            if !(tier.mcap_threshold.is_finite() && tier.mcap_threshold > 0.0) {
                return Err(invalid(format!("tier {}: mcap_threshold must be positive", tier.tier)));
            }
            if tier.max_spots == 0 {
                return Err(invalid(format!("tier {}: max_spots must be positive", tier.tier)));
            }
            check_percentage("buffdoge_percentage", tier.tier, tier.buffdoge_percentage)?;
            check_percentage("sol_percentage", tier.tier, tier.sol_percentage)?;
        }

        let buffdoge: f64 = self
            .tiers
            .iter()
            .map(|t| t.buffdoge_percentage * t.max_spots as f64)
            .sum();
        let sol: f64 = self.tiers.iter().map(|t| t.sol_percentage * t.max_spots as f64).sum();
        if buffdoge > 100.0 + 1e-9 {
            return Err(invalid(format!("buffdoge percentages total {} > 100", buffdoge)));
        }
        if sol > 100.0 + 1e-9 {
            return Err(invalid(format!("sol percentages total {} > 100", sol)));
        }
        Ok(())
    }

    /// Window overlaps `other` and both are active
    pub(crate) fn conflicts_with(&self, other: &TemplePhase) -> bool {
        self.is_active
            && other.is_active
            && self.start_date <= other.end_date
            && other.start_date <= self.end_date
    }

    pub(crate) fn into_phase(self) -> TemplePhase {
        let mut tier_rewards: Vec<TierReward> = self
            .tiers
            .into_iter()
            .map(|t| TierReward {
                tier: t.tier,
                mcap_threshold: t.mcap_threshold,
                max_spots: t.max_spots,
                buffdoge_percentage: t.buffdoge_percentage,
                sol_percentage: t.sol_percentage,
                spots_used: 0,
            })
            .collect();
        tier_rewards.sort_by_key(|t| t.tier);

        TemplePhase {
            id: PhaseId::new(),
            phase_number: self.phase_number,
            start_date: self.start_date,
            end_date: self.end_date,
            is_active: self.is_active,
            total_buffdoge_rewards: self.total_buffdoge_rewards,
            total_sol_rewards: self.total_sol_rewards,
            tier_rewards,
        }
    }
}

/// Spot occupancy of one tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierStatus {
    #[serde(flatten)]
    pub reward: TierReward,
    pub spots_filled: u32,
    pub spots_remaining: u32,
}

/// Current phase with per-tier occupancy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseStatus {
    pub phase: TemplePhase,
    pub tiers: Vec<TierStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request() -> PhaseRequest {
        let now = Utc::now();
        PhaseRequest {
            phase_number: 1,
            start_date: now,
            end_date: now + Duration::days(7),
            is_active: true,
            total_buffdoge_rewards: 1_000_000.0,
            total_sol_rewards: 100.0,
            tiers: vec![
                TierRequest {
                    tier: 2,
                    mcap_threshold: 100_000.0,
                    max_spots: 1,
                    buffdoge_percentage: 50.0,
                    sol_percentage: 50.0,
                },
                TierRequest {
                    tier: 1,
                    mcap_threshold: 50_000.0,
                    max_spots: 5,
                    buffdoge_percentage: 10.0,
                    sol_percentage: 10.0,
                },
            ],
        }
    }

    #[test]
    fn test_valid_request_sorts_tiers() {
        let req = request();
        assert!(req.validate().is_ok());
        let phase = req.into_phase();
        assert_eq!(phase.tier_rewards[0].tier, 1);
        assert_eq!(phase.tier_rewards[1].tier, 2);
        assert!(phase.tier_rewards.iter().all(|t| t.spots_used == 0));
    }

    #[test]
    fn test_inverted_window_rejected() {
        let mut req = request();
        req.end_date = req.start_date;
        assert!(matches!(req.validate(), Err(TempleError::InvalidPhase(_))));
    }

    #[test]
    fn test_duplicate_tier_rejected() {
        let mut req = request();
        req.tiers[1].tier = 2;
        assert!(matches!(req.validate(), Err(TempleError::InvalidPhase(_))));
    }

    #[test]
    fn test_over_committed_budget_rejected() {
        let mut req = request();
        req.tiers[1].sol_percentage = 11.0;
        assert!(matches!(req.validate(), Err(TempleError::InvalidPhase(_))));
    }

    #[test]
    fn test_zero_spots_rejected() {
        let mut req = request();
        req.tiers[0].max_spots = 0;
        assert!(matches!(req.validate(), Err(TempleError::InvalidPhase(_))));
    }
}
