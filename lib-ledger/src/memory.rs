//! In-memory LedgerStore
//!
//! The whole ledger sits behind one `RwLock`; every unit of work runs under
//! the write guard, so it is trivially all-or-nothing.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use lib_types::{Amount, PhaseId, TokenId, UserId, AMOUNT_EPSILON};

use crate::errors::{Entity, LedgerError, LedgerResult};
use crate::records::{
    AchievementKey, Balance, GraduationRecord, StakingPool, TempleAchievement, TemplePhase,
    Token, TokenReward, Trade, UserStake,
};
use crate::store::{
    apply_balance_delta, apply_stake_delta, check_version, claim_spot, mark_reward_distributed,
    take_allocation, LedgerStore, StakeCommit, TradeCommit,
};

#[derive(Debug, Default)]
struct LedgerState {
    tokens: HashMap<TokenId, Token>,
    balances: HashMap<(TokenId, UserId), Amount>,
    trades: HashMap<TokenId, Vec<Trade>>,
    pool: StakingPool,
    stakes: HashMap<UserId, UserStake>,
    graduations: HashMap<TokenId, GraduationRecord>,
    phases: HashMap<PhaseId, TemplePhase>,
    achievements: HashMap<AchievementKey, TempleAchievement>,
}

/// Ledger held entirely in process memory
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedger {
    fn insert_token(&self, token: Token, reward: TokenReward) -> LedgerResult<()> {
        let mut state = self.state.write();
        if state.tokens.contains_key(&token.id) {
            return Err(LedgerError::TokenExists(token.id));
        }
        state.pool.token_rewards.push(reward);
        state.tokens.insert(token.id, token);
        Ok(())
    }

    fn get_token(&self, id: &TokenId) -> LedgerResult<Option<Token>> {
        Ok(self.state.read().tokens.get(id).cloned())
    }

    fn list_tokens(&self) -> LedgerResult<Vec<Token>> {
        let mut tokens: Vec<Token> = self.state.read().tokens.values().cloned().collect();
        tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tokens)
    }

    fn get_balance(&self, user: &UserId, token: &TokenId) -> LedgerResult<Amount> {
        Ok(self
            .state
            .read()
            .balances
            .get(&(*token, *user))
            .copied()
            .unwrap_or(0.0))
    }

    fn holders(&self, token: &TokenId) -> LedgerResult<Vec<Balance>> {
        let state = self.state.read();
        Ok(state
            .balances
            .iter()
            .filter(|((t, _), amount)| t == token && **amount > AMOUNT_EPSILON)
            .map(|((t, u), amount)| Balance {
                user: *u,
                token: *t,
                amount: *amount,
            })
            .collect())
    }

    fn commit_trade(&self, commit: TradeCommit) -> LedgerResult<Token> {
        let mut state = self.state.write();
        let TradeCommit {
            mut token,
            expected_version,
            trade,
            balance_delta,
            balance_cap,
            fee,
        } = commit;

        let found = state.tokens.get(&token.id).map(|t| t.version);
        if found.is_none() {
            return Err(LedgerError::TokenNotFound(token.id));
        }
        check_version(Entity::Token, Some(expected_version), found)?;

        let key = (token.id, trade.user);
        let have = state.balances.get(&key).copied().unwrap_or(0.0);
        let next = apply_balance_delta(have, balance_delta, balance_cap)?;

        token.version = expected_version + 1;
        state.balances.insert(key, next);
        state.pool.total_sol_rewards += fee;
        state.trades.entry(token.id).or_default().push(trade);
        state.tokens.insert(token.id, token.clone());
        Ok(token)
    }

    fn trades_for_token(&self, token: &TokenId, limit: usize) -> LedgerResult<Vec<Trade>> {
        let state = self.state.read();
        Ok(state
            .trades
            .get(token)
            .map(|trades| trades.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn staking_pool(&self) -> LedgerResult<StakingPool> {
        Ok(self.state.read().pool.clone())
    }

    fn get_user_stake(&self, user: &UserId) -> LedgerResult<Option<UserStake>> {
        Ok(self.state.read().stakes.get(user).cloned())
    }

    fn list_user_stakes(&self) -> LedgerResult<Vec<UserStake>> {
        Ok(self.state.read().stakes.values().cloned().collect())
    }

    fn commit_stake(&self, commit: StakeCommit) -> LedgerResult<UserStake> {
        let mut state = self.state.write();
        let StakeCommit {
            mut stake,
            expected_version,
            staked_delta,
        } = commit;

        let found = state.stakes.get(&stake.user).map(|s| s.version);
        check_version(Entity::UserStake, expected_version, found)?;
        let total = apply_stake_delta(state.pool.total_staked, staked_delta)?;

        stake.version = expected_version.map_or(1, |v| v + 1);
        state.pool.total_staked = total;
        state.stakes.insert(stake.user, stake.clone());
        Ok(stake)
    }

    fn get_graduation(&self, token: &TokenId) -> LedgerResult<Option<GraduationRecord>> {
        Ok(self.state.read().graduations.get(token).cloned())
    }

    fn insert_graduation(&self, record: GraduationRecord) -> LedgerResult<GraduationRecord> {
        let mut state = self.state.write();
        Ok(state
            .graduations
            .entry(record.token)
            .or_insert(record)
            .clone())
    }

    fn credit_airdrop(
        &self,
        token: &TokenId,
        user: &UserId,
        received_at: DateTime<Utc>,
    ) -> LedgerResult<bool> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let mut record = state
            .graduations
            .get(token)
            .cloned()
            .ok_or(LedgerError::GraduationNotFound(*token))?;
        let airdrop = match take_allocation(&mut record, user, received_at)? {
            Some(airdrop) => airdrop,
            None => return Ok(false),
        };

        let mut stake = state
            .stakes
            .get(user)
            .cloned()
            .unwrap_or_else(|| UserStake::empty(*user));
        stake.version += 1;
        let amount = airdrop.amount;
        stake.token_airdrops.push(airdrop);

        *state.balances.entry((*token, *user)).or_insert(0.0) += amount;
        state.stakes.insert(*user, stake);
        state.graduations.insert(*token, record);
        Ok(true)
    }

    fn complete_graduation(&self, token: &TokenId) -> LedgerResult<GraduationRecord> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let record = state
            .graduations
            .get_mut(token)
            .ok_or(LedgerError::GraduationNotFound(*token))?;
        record.completed = true;
        let record = record.clone();
        mark_reward_distributed(&mut state.pool, token);
        Ok(record)
    }

    fn pending_graduations(&self) -> LedgerResult<Vec<GraduationRecord>> {
        Ok(self
            .state
            .read()
            .graduations
            .values()
            .filter(|g| !g.completed)
            .cloned()
            .collect())
    }

    fn insert_phase(&self, phase: TemplePhase) -> LedgerResult<()> {
        let mut state = self.state.write();
        if state
            .phases
            .values()
            .any(|p| p.phase_number == phase.phase_number)
        {
            return Err(LedgerError::PhaseExists(phase.phase_number));
        }
        state.phases.insert(phase.id, phase);
        Ok(())
    }

    fn get_phase(&self, id: &PhaseId) -> LedgerResult<Option<TemplePhase>> {
        Ok(self.state.read().phases.get(id).cloned())
    }

    fn list_phases(&self) -> LedgerResult<Vec<TemplePhase>> {
        let mut phases: Vec<TemplePhase> = self.state.read().phases.values().cloned().collect();
        phases.sort_by_key(|p| p.phase_number);
        Ok(phases)
    }

    fn get_achievement(&self, key: &AchievementKey) -> LedgerResult<Option<TempleAchievement>> {
        Ok(self.state.read().achievements.get(key).cloned())
    }

    fn list_achievements(&self, phase: Option<&PhaseId>) -> LedgerResult<Vec<TempleAchievement>> {
        let state = self.state.read();
        Ok(state
            .achievements
            .values()
            .filter(|a| phase.map_or(true, |p| &a.phase == p))
            .cloned()
            .collect())
    }

    fn put_achievement(
        &self,
        mut achievement: TempleAchievement,
        expected_version: Option<u64>,
    ) -> LedgerResult<TempleAchievement> {
        let mut state = self.state.write();
        let key = achievement.key();
        let found = state.achievements.get(&key).map(|a| a.version);
        check_version(Entity::Achievement, expected_version, found)?;

        achievement.version = expected_version.map_or(1, |v| v + 1);
        state.achievements.insert(key, achievement.clone());
        Ok(achievement)
    }

    fn award_achievement(
        &self,
        mut achievement: TempleAchievement,
        expected_version: u64,
    ) -> LedgerResult<TempleAchievement> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let key = achievement.key();

        let found = state.achievements.get(&key).map(|a| a.version);
        check_version(Entity::Achievement, Some(expected_version), found)?;

        let mut phase = state
            .phases
            .get(&achievement.phase)
            .cloned()
            .ok_or(LedgerError::PhaseNotFound(achievement.phase))?;
        let spot = claim_spot(&mut phase, achievement.tier)?;

        achievement.spot_number = spot;
        achievement.version = expected_version + 1;
        state.phases.insert(phase.id, phase);
        state.achievements.insert(key, achievement.clone());
        Ok(achievement)
    }
}
