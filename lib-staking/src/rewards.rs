//! Reward Accrual
//!
//! A staker's entitlement is recomputed lazily from the pool at read time:
//!
//! ```text
//!   share       = staked / total_staked × 100
//!   entitlement = total_sol_rewards × share / 100
//!   unclaimed   = max(0, entitlement − claimed)
//! ```
//!
//! Claiming sets `claimed = entitlement`. Because the share is taken against
//! the current pool total, stake movements by others between accrual and
//! claim shift the entitlement.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use lib_ledger::{LedgerStore, StakeCommit, StakingPool, TokenAirdrop, UserStake};
use lib_types::{Amount, TokenId, UserId, AMOUNT_EPSILON};

use crate::config::StakingConfig;
use crate::errors::{StakingError, StakingResult};
use crate::ledger::with_retry;

/// User's share of one token's staker allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRewardShare {
    pub token: TokenId,
    pub symbol: String,
    pub amount: Amount,
    pub distributed: bool,
}

/// Reward position of one staker
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RewardSummary {
    pub share_percentage: f64,
    pub total_entitlement: Amount,
    pub claimed: Amount,
    pub unclaimed: Amount,
    pub token_rewards: Vec<TokenRewardShare>,
    pub airdrops: Vec<TokenAirdrop>,
}

/// Point-in-time SOL reward figures
fn accrue(pool: &StakingPool, stake: &UserStake) -> (f64, Amount, Amount) {
    if pool.total_staked <= 0.0 {
        return (0.0, 0.0, 0.0);
    }
    let share = stake.staked_amount / pool.total_staked * 100.0;
    let entitlement = pool.total_sol_rewards * share / 100.0;
    let unclaimed = (entitlement - stake.claimed_sol_rewards).max(0.0);
    (share, entitlement, unclaimed)
}

/// Computes and pays out staker rewards
pub struct RewardAccrual {
    store: Arc<dyn LedgerStore>,
    max_commit_attempts: u32,
}

impl std::fmt::Debug for RewardAccrual {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewardAccrual").finish_non_exhaustive()
    }
}

impl RewardAccrual {
    pub fn new(store: Arc<dyn LedgerStore>, config: &StakingConfig) -> Self {
        Self {
            store,
            max_commit_attempts: config.max_commit_attempts,
        }
    }

    pub fn user_rewards(&self, user: &UserId) -> StakingResult<RewardSummary> {
        let pool = self.store.staking_pool()?;
        let stake = match self.store.get_user_stake(user)? {
            Some(stake) => stake,
            None => return Ok(RewardSummary::default()),
        };

        // nothing to share against, every figure reads zero
        if pool.total_staked <= 0.0 {
            return Ok(RewardSummary::default());
        }
        let (share, entitlement, unclaimed) = accrue(&pool, &stake);

        let token_rewards = pool
            .token_rewards
            .iter()
            .map(|r| TokenRewardShare {
                token: r.token,
                symbol: r.symbol.clone(),
                amount: r.amount * share / 100.0,
                distributed: r.distributed,
            })
            .collect();

        Ok(RewardSummary {
            share_percentage: share,
            total_entitlement: entitlement,
            claimed: stake.claimed_sol_rewards,
            unclaimed,
            token_rewards,
            airdrops: stake.token_airdrops,
        })
    }

    /// Pay out everything unclaimed
    pub fn claim(&self, user: &UserId) -> StakingResult<Amount> {
        let payout = with_retry(self.max_commit_attempts, "claim", user, || {
            let pool = self.store.staking_pool()?;
            let mut stake = self
                .store
                .get_user_stake(user)?
                .ok_or(StakingError::NoRewardsAvailable)?;
            let version = stake.version;

            let (_, entitlement, unclaimed) = accrue(&pool, &stake);
            if unclaimed <= AMOUNT_EPSILON {
                return Err(StakingError::NoRewardsAvailable);
            }
            stake.claimed_sol_rewards = entitlement;
            self.store.commit_stake(StakeCommit {
                stake,
                expected_version: Some(version),
                staked_delta: 0.0,
            })?;
            Ok(unclaimed)
        })?;

        info!(user = %user, payout, "Rewards claimed");
        Ok(payout)
    }
}
