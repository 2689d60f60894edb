//! Ledger Store Contract
//!
//! All persistence goes through [`LedgerStore`]. Engines read records freely
//! but every financial mutation is one of the unit-of-work primitives below,
//! each of which either commits all of its writes or none of them.
//!
//! # Invariants enforced by every backend
//!
//! 1. **One balance per (user, token)**, never negative.
//! 2. **`StakingPool::total_staked` equals the sum of all stakes** - it only
//!    moves inside `commit_stake` together with the stake it belongs to.
//! 3. **`StakingPool::total_sol_rewards` never decreases** - it only moves
//!    inside `commit_trade` by the trade fee.
//! 4. **`TierReward::spots_used <= max_spots`** - checked and incremented
//!    in the same unit as the achievement it awards.
//! 5. **Versioned records are compare-and-swapped** - a stale version fails
//!    with [`LedgerError::VersionConflict`] and nothing is written.

use chrono::{DateTime, Utc};

use lib_types::{Amount, PhaseId, TokenId, UserId, AMOUNT_EPSILON};

use crate::errors::{Entity, LedgerError, LedgerResult};
use crate::records::{
    AchievementKey, Balance, GraduationRecord, StakingPool, TempleAchievement, TemplePhase,
    Token, TokenAirdrop, TokenReward, Trade, UserStake,
};

// =============================================================================
// UNITS OF WORK
// =============================================================================

/// Everything one trade changes
#[derive(Debug, Clone)]
pub struct TradeCommit {
    /// Post-trade token state
    pub token: Token,
    /// Version the post-trade state was computed from
    pub expected_version: u64,
    pub trade: Trade,
    /// Signed change to the trader's balance of `token`
    pub balance_delta: Amount,
    /// Upper bound on the trader's resulting balance
    pub balance_cap: Option<Amount>,
    /// Credited to `StakingPool::total_sol_rewards`
    pub fee: Amount,
}

/// Everything one staking operation changes
#[derive(Debug, Clone)]
pub struct StakeCommit {
    /// New state of the user's stake
    pub stake: UserStake,
    /// Version the new state was computed from, `None` when no record existed
    pub expected_version: Option<u64>,
    /// Signed change applied to `StakingPool::total_staked`
    pub staked_delta: Amount,
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Launchpad ledger store
///
/// Object safe, shared as `Arc<dyn LedgerStore>`.
pub trait LedgerStore: Send + Sync + std::fmt::Debug {
    // -------------------------------------------------------------------------
    // Tokens & balances
    // -------------------------------------------------------------------------

    /// Insert a new token together with its staker reward allocation
    fn insert_token(&self, token: Token, reward: TokenReward) -> LedgerResult<()>;

    fn get_token(&self, id: &TokenId) -> LedgerResult<Option<Token>>;

    /// All tokens, newest first
    fn list_tokens(&self) -> LedgerResult<Vec<Token>>;

    /// Balance of `user` in `token`, zero when no record exists
    fn get_balance(&self, user: &UserId, token: &TokenId) -> LedgerResult<Amount>;

    /// Every holder of `token` with a positive balance
    fn holders(&self, token: &TokenId) -> LedgerResult<Vec<Balance>>;

    // -------------------------------------------------------------------------
    // Trades
    // -------------------------------------------------------------------------

    /// Commit a trade: token CAS, balance upsert, fee credit, trade append
    ///
    /// Returns the token as stored, with its bumped version.
    fn commit_trade(&self, commit: TradeCommit) -> LedgerResult<Token>;

    /// Most recent trades of `token`, newest first
    fn trades_for_token(&self, token: &TokenId, limit: usize) -> LedgerResult<Vec<Trade>>;

    // -------------------------------------------------------------------------
    // Staking
    // -------------------------------------------------------------------------

    fn staking_pool(&self) -> LedgerResult<StakingPool>;

    fn get_user_stake(&self, user: &UserId) -> LedgerResult<Option<UserStake>>;

    fn list_user_stakes(&self) -> LedgerResult<Vec<UserStake>>;

    /// Commit a stake change: stake CAS and pool total in one unit
    fn commit_stake(&self, commit: StakeCommit) -> LedgerResult<UserStake>;

    // -------------------------------------------------------------------------
    // Graduation
    // -------------------------------------------------------------------------

    fn get_graduation(&self, token: &TokenId) -> LedgerResult<Option<GraduationRecord>>;

    /// Insert the record unless one already exists; returns the stored record
    fn insert_graduation(&self, record: GraduationRecord) -> LedgerResult<GraduationRecord>;

    /// Credit one staker's allocation
    ///
    /// Credits the balance, appends the airdrop to the user's stake and flags
    /// the allocation in one unit. Returns `false` when already credited.
    fn credit_airdrop(
        &self,
        token: &TokenId,
        user: &UserId,
        received_at: DateTime<Utc>,
    ) -> LedgerResult<bool>;

    /// Mark the graduation completed and its token reward distributed
    fn complete_graduation(&self, token: &TokenId) -> LedgerResult<GraduationRecord>;

    /// Graduation records not yet completed
    fn pending_graduations(&self) -> LedgerResult<Vec<GraduationRecord>>;

    // -------------------------------------------------------------------------
    // Temple
    // -------------------------------------------------------------------------

    /// Insert a phase; phase numbers are unique
    fn insert_phase(&self, phase: TemplePhase) -> LedgerResult<()>;

    fn get_phase(&self, id: &PhaseId) -> LedgerResult<Option<TemplePhase>>;

    /// All phases ordered by phase number
    fn list_phases(&self) -> LedgerResult<Vec<TemplePhase>>;

    fn get_achievement(&self, key: &AchievementKey) -> LedgerResult<Option<TempleAchievement>>;

    /// Achievements of one phase, or of every phase
    fn list_achievements(&self, phase: Option<&PhaseId>) -> LedgerResult<Vec<TempleAchievement>>;

    /// Insert or update an achievement that does not claim a spot
    fn put_achievement(
        &self,
        achievement: TempleAchievement,
        expected_version: Option<u64>,
    ) -> LedgerResult<TempleAchievement>;

    /// Award a tier spot to an achievement
    ///
    /// Succeeds only while `spots_used < max_spots`; increments `spots_used`
    /// and assigns it as the achievement's spot number. Fails with
    /// [`LedgerError::SpotsExhausted`] otherwise.
    fn award_achievement(
        &self,
        achievement: TempleAchievement,
        expected_version: u64,
    ) -> LedgerResult<TempleAchievement>;
}

// =============================================================================
// SHARED COMMIT RULES
// =============================================================================
// Backends call these inside their critical section so both apply identical
// checks before writing anything.
// =============================================================================

pub(crate) fn check_version(
    entity: Entity,
    expected: Option<u64>,
    found: Option<u64>,
) -> LedgerResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(LedgerError::VersionConflict {
            entity,
            expected,
            found,
        })
    }
}

/// Resulting balance after a signed delta
pub(crate) fn apply_balance_delta(
    have: Amount,
    delta: Amount,
    cap: Option<Amount>,
) -> LedgerResult<Amount> {
    let next = have + delta;
    if next < -AMOUNT_EPSILON {
        return Err(LedgerError::InsufficientBalance { have, need: -delta });
    }
    if let Some(cap) = cap {
        if delta > 0.0 && next > cap + AMOUNT_EPSILON {
            return Err(LedgerError::BalanceCapExceeded {
                cap,
                would_have: next,
            });
        }
    }
    Ok(next.max(0.0))
}

/// Resulting pool total after a signed stake delta
pub(crate) fn apply_stake_delta(total: Amount, delta: Amount) -> LedgerResult<Amount> {
    let next = total + delta;
    if next < -AMOUNT_EPSILON {
        return Err(LedgerError::NegativeStake { have: total, delta });
    }
    Ok(next.max(0.0))
}

/// Claim the next spot of `tier` in `phase`, returning the spot number
pub(crate) fn claim_spot(phase: &mut TemplePhase, tier: u8) -> LedgerResult<u32> {
    let phase_id = phase.id;
    let reward = phase
        .tier_rewards
        .iter_mut()
        .find(|t| t.tier == tier)
        .ok_or(LedgerError::TierNotFound { phase: phase_id, tier })?;
    if reward.is_full() {
        return Err(LedgerError::SpotsExhausted {
            tier,
            max_spots: reward.max_spots,
        });
    }
    reward.spots_used += 1;
    Ok(reward.spots_used)
}

/// Flag `user`'s allocation as credited and build the airdrop entry
///
/// Returns `None` when the allocation was already credited.
pub(crate) fn take_allocation(
    record: &mut GraduationRecord,
    user: &UserId,
    received_at: DateTime<Utc>,
) -> LedgerResult<Option<TokenAirdrop>> {
    let token = record.token;
    let symbol = record.symbol.clone();
    let allocation = record
        .allocations
        .iter_mut()
        .find(|a| &a.user == user)
        .ok_or(LedgerError::AllocationNotFound { token, user: *user })?;
    if allocation.credited {
        return Ok(None);
    }
    allocation.credited = true;
    Ok(Some(TokenAirdrop {
        token,
        symbol,
        amount: allocation.amount,
        received_at,
        claimed: false,
    }))
}

/// Flag the pool's reward allocation for `token` as distributed
pub(crate) fn mark_reward_distributed(pool: &mut StakingPool, token: &TokenId) {
    if let Some(reward) = pool.token_rewards.iter_mut().find(|r| &r.token == token) {
        reward.distributed = true;
    }
}
