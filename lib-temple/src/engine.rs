//! Temple Achievement Engine
//!
//! Tracks, per (phase, tier, token), how long a token's market cap has held
//! above the tier threshold and awards the tier's limited spots.
//!
//! ```text
//!            mcap >= threshold            held >= hold duration
//!   (none) ──────────────────▶ Running ─────────────────────────▶ Achieved
//!                               │   ▲      (spot claimed)
//!          mcap < threshold     │   │ mcap >= threshold
//!                               ▼   │
//!                               Reset
//!
//!   Running ── tier filled before the hold completed ──▶ Abandoned
//! ```
//!
//! # Invariants
//!
//! - At most one record per (phase, tier, token).
//! - Achieved and Abandoned are terminal.
//! - A tier never has more achieved records than `max_spots`: the spot is
//!   claimed in the same store commit that marks the record achieved.
//!
//! Only the current phase is evaluated. Evaluation is idempotent, so the
//! same token may be evaluated after every trade and by the periodic sweep.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use lib_ledger::{
    AchievementKey, AchievementState, HolderSnapshot, LedgerError, LedgerStore, TempleAchievement,
    TemplePhase, Token,
};
use lib_types::{Clock, PhaseId, TokenId, AMOUNT_EPSILON};

use crate::config::TempleConfig;
use crate::errors::{TempleError, TempleResult};
use crate::phase::{PhaseRequest, PhaseStatus, TierStatus};

/// What one evaluation did to one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TierOutcome {
    /// First time above the threshold, timer started
    TimerStarted,
    /// Back above the threshold after a reset
    TimerRestarted,
    /// Timer running, hold not complete yet
    Holding,
    /// Fell below the threshold, timer stopped
    TimerReset,
    Achieved { spot: u32 },
    /// Tier filled while the timer was running
    Abandoned,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierEvaluation {
    pub token: TokenId,
    pub tier: u8,
    pub outcome: TierOutcome,
}

/// Runs the achievement program against the ledger
pub struct TempleAchievementEngine {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    config: TempleConfig,
}

impl std::fmt::Debug for TempleAchievementEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempleAchievementEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TempleAchievementEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        config: TempleConfig,
    ) -> TempleResult<Self> {
        config.validate()?;
        Ok(Self { store, clock, config })
    }

    pub fn config(&self) -> &TempleConfig {
        &self.config
    }

    // =========================================================================
    // Phases
    // =========================================================================

    /// The active phase whose window contains now
    pub fn current_phase(&self) -> TempleResult<Option<TemplePhase>> {
        let now = self.clock.now();
        let phases = self.store.list_phases()?;
        Ok(phases.into_iter().rev().find(|p| p.is_current(now)))
    }

    /// Current phase with spots filled and remaining per tier
    pub fn phase_status(&self) -> TempleResult<Option<PhaseStatus>> {
        let phase = match self.current_phase()? {
            Some(phase) => phase,
            None => return Ok(None),
        };
        let achievements = self.store.list_achievements(Some(&phase.id))?;

        let tiers = phase
            .tier_rewards
            .iter()
            .map(|reward| {
                let filled = achievements
                    .iter()
                    .filter(|a| a.tier == reward.tier && a.achieved_at.is_some())
                    .count() as u32;
                TierStatus {
                    reward: reward.clone(),
                    spots_filled: filled,
                    spots_remaining: reward.max_spots.saturating_sub(filled),
                }
            })
            .collect();

        Ok(Some(PhaseStatus { phase, tiers }))
    }

    pub fn create_phase(&self, request: PhaseRequest) -> TempleResult<TemplePhase> {
        request.validate()?;
        if let Some(other) = self
            .store
            .list_phases()?
            .iter()
            .find(|p| request.conflicts_with(p))
        {
            return Err(TempleError::InvalidPhase(format!(
                "active window overlaps phase {}",
                other.phase_number
            )));
        }

        let phase = request.into_phase();
        self.store.insert_phase(phase.clone())?;
        info!(
            phase = phase.phase_number,
            start = %phase.start_date,
            end = %phase.end_date,
            tiers = phase.tier_rewards.len(),
            "Temple phase created"
        );
        Ok(phase)
    }

    /// Achievements of a phase, defaulting to the current one
    ///
    /// With no phase given and none current, every achievement is returned.
    /// Sorted by tier, then by achievement time with running timers first.
    pub fn achievements(&self, phase: Option<&PhaseId>) -> TempleResult<Vec<TempleAchievement>> {
        let current = match phase {
            Some(_) => None,
            None => self.current_phase()?.map(|p| p.id),
        };
        let mut achievements = self.store.list_achievements(phase.or(current.as_ref()))?;
        achievements.sort_by_key(|a| (a.tier, a.achieved_at));
        Ok(achievements)
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    /// Evaluate every tier of the current phase for `token`
    ///
    /// `token` only names what to evaluate. Each tier re-reads the stored
    /// token, so a snapshot that went stale under a concurrent trade is never
    /// checked against a threshold.
    pub fn evaluate_token(&self, token: &Token) -> TempleResult<Vec<TierEvaluation>> {
        let now = self.clock.now();
        let phase = match self.current_phase()? {
            Some(phase) => phase,
            None => return Ok(Vec::new()),
        };

        let mut evaluations = Vec::with_capacity(phase.tier_rewards.len());
        for reward in &phase.tier_rewards {
            let key = AchievementKey {
                phase: phase.id,
                tier: reward.tier,
                token: token.id,
            };
            let outcome = self.with_retry(&key, || self.evaluate_tier(&key, now))?;
            evaluations.push(TierEvaluation {
                token: token.id,
                tier: reward.tier,
                outcome,
            });
        }
        Ok(evaluations)
    }

    /// Re-evaluate every running timer of the current phase
    ///
    /// Catches holds that complete without a further trade on the token.
    pub fn sweep(&self) -> TempleResult<Vec<TierEvaluation>> {
        let now = self.clock.now();
        let phase = match self.current_phase()? {
            Some(phase) => phase,
            None => return Ok(Vec::new()),
        };

        let running: BTreeSet<AchievementKey> = self
            .store
            .list_achievements(Some(&phase.id))?
            .into_iter()
            .filter(|a| a.state() == AchievementState::TimerRunning)
            .map(|a| a.key())
            .collect();

        let mut evaluations = Vec::with_capacity(running.len());
        for key in running {
            let outcome = self.with_retry(&key, || self.evaluate_tier(&key, now))?;
            evaluations.push(TierEvaluation {
                token: key.token,
                tier: key.tier,
                outcome,
            });
        }

        debug!(phase = phase.phase_number, timers = evaluations.len(), "Temple sweep done");
        Ok(evaluations)
    }

    fn with_retry<T>(
        &self,
        key: &AchievementKey,
        mut attempt: impl FnMut() -> TempleResult<T>,
    ) -> TempleResult<T> {
        let attempts = self.config.max_commit_attempts;
        for n in 1..=attempts {
            match attempt() {
                Err(e) if e.is_conflict() => {
                    warn!(
                        token = %key.token,
                        tier = key.tier,
                        attempt = n,
                        "Achievement commit conflicted, retrying"
                    );
                }
                other => return other,
            }
        }
        Err(TempleError::Conflict { attempts })
    }

    /// One read-decide-commit pass over a single tier
    ///
    /// Market cap and spot count are read fresh on every attempt; the spot
    /// itself is claimed atomically by the store.
    fn evaluate_tier(&self, key: &AchievementKey, now: DateTime<Utc>) -> TempleResult<TierOutcome> {
        let token = self
            .store
            .get_token(&key.token)?
            .ok_or(LedgerError::TokenNotFound(key.token))?;
        let phase = self
            .store
            .get_phase(&key.phase)?
            .ok_or(TempleError::PhaseNotFound(key.phase))?;
        let reward = phase
            .tier(key.tier)
            .ok_or(LedgerError::TierNotFound {
                phase: key.phase,
                tier: key.tier,
            })?
            .clone();
        let existing = self.store.get_achievement(key)?;

        let state = existing.as_ref().map(|a| a.state());
        if matches!(
            state,
            Some(AchievementState::Achieved) | Some(AchievementState::Abandoned)
        ) {
            return Ok(TierOutcome::Unchanged);
        }

        if token.market_cap < reward.mcap_threshold {
            return match existing {
                Some(achievement) if state == Some(AchievementState::TimerRunning) => {
                    self.reset_timer(achievement, token.market_cap)
                }
                _ => Ok(TierOutcome::Unchanged),
            };
        }

        if reward.is_full() {
            return match existing {
                Some(achievement) if state == Some(AchievementState::TimerRunning) => {
                    self.abandon(achievement, now)
                }
                _ => Ok(TierOutcome::Unchanged),
            };
        }

        match existing {
            None => {
                let achievement = TempleAchievement {
                    token: token.id,
                    phase: phase.id,
                    tier: reward.tier,
                    mcap_threshold: reward.mcap_threshold,
                    timer_started_at: Some(now),
                    achieved_at: None,
                    abandoned_at: None,
                    holder_snapshot: Vec::new(),
                    spot_number: reward.spots_used + 1,
                    buffdoge_reward: phase.total_buffdoge_rewards * reward.buffdoge_percentage
                        / 100.0,
                    sol_reward: phase.total_sol_rewards * reward.sol_percentage / 100.0,
                    version: 0,
                };
                self.store.put_achievement(achievement, None)?;
                info!(
                    token = %token.id,
                    tier = reward.tier,
                    market_cap = token.market_cap,
                    threshold = reward.mcap_threshold,
                    "Temple timer started"
                );
                Ok(TierOutcome::TimerStarted)
            }
            Some(mut achievement) if achievement.timer_started_at.is_none() => {
                let version = achievement.version;
                achievement.timer_started_at = Some(now);
                achievement.spot_number = reward.spots_used + 1;
                self.store.put_achievement(achievement, Some(version))?;
                info!(token = %token.id, tier = reward.tier, "Temple timer restarted");
                Ok(TierOutcome::TimerRestarted)
            }
            Some(achievement) => self.try_award(achievement, &token, now),
        }
    }

    fn try_award(
        &self,
        mut achievement: TempleAchievement,
        token: &Token,
        now: DateTime<Utc>,
    ) -> TempleResult<TierOutcome> {
        let started = match achievement.timer_started_at {
            Some(started) => started,
            None => return Ok(TierOutcome::Unchanged),
        };
        if now - started < self.config.hold_duration() {
            return Ok(TierOutcome::Holding);
        }

        let version = achievement.version;
        achievement.achieved_at = Some(now);
        achievement.holder_snapshot = self.snapshot(token)?;

        match self.store.award_achievement(achievement.clone(), version) {
            Ok(awarded) => {
                info!(
                    token = %token.id,
                    tier = awarded.tier,
                    spot = awarded.spot_number,
                    holders = awarded.holder_snapshot.len(),
                    "Temple tier achieved"
                );
                Ok(TierOutcome::Achieved {
                    spot: awarded.spot_number,
                })
            }
            Err(LedgerError::SpotsExhausted { .. }) => {
                achievement.achieved_at = None;
                achievement.holder_snapshot.clear();
                self.abandon(achievement, now)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn reset_timer(
        &self,
        mut achievement: TempleAchievement,
        market_cap: f64,
    ) -> TempleResult<TierOutcome> {
        let version = achievement.version;
        achievement.timer_started_at = None;
        let stored = self.store.put_achievement(achievement, Some(version))?;
        info!(
            token = %stored.token,
            tier = stored.tier,
            market_cap,
            threshold = stored.mcap_threshold,
            "Temple timer reset"
        );
        Ok(TierOutcome::TimerReset)
    }

    fn abandon(
        &self,
        mut achievement: TempleAchievement,
        now: DateTime<Utc>,
    ) -> TempleResult<TierOutcome> {
        let version = achievement.version;
        achievement.timer_started_at = None;
        achievement.abandoned_at = Some(now);
        let stored = self.store.put_achievement(achievement, Some(version))?;
        warn!(token = %stored.token, tier = stored.tier, "Temple tier filled, timer abandoned");
        Ok(TierOutcome::Abandoned)
    }

    /// Every holder with a positive balance, as a share of total supply
    fn snapshot(&self, token: &Token) -> TempleResult<Vec<HolderSnapshot>> {
        let supply = token.total_supply;
        Ok(self
            .store
            .holders(&token.id)?
            .into_iter()
            .filter(|b| b.amount > AMOUNT_EPSILON)
            .map(|b| HolderSnapshot {
                user: b.user,
                amount: b.amount,
                percentage: if supply > 0.0 {
                    b.amount / supply * 100.0
                } else {
                    0.0
                },
            })
            .collect())
    }
}
