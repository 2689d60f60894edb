//! Sled-based LedgerStore Implementation
//!
//! All records live in one tree so every unit of work is a single sled
//! transaction. Values are bincode, keys are built in [`crate::keys`].
//! Scans run outside transactions and may observe a unit of work either
//! before or after it commits, never half of it.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{
    ConflictableTransactionError, TransactionError, TransactionResult, TransactionalTree,
};
use sled::{Db, Tree};
use tracing::debug;

use lib_types::{Amount, PhaseId, TokenId, UserId, AMOUNT_EPSILON};

use crate::errors::{Entity, LedgerError, LedgerResult};
use crate::keys;
use crate::records::{
    AchievementKey, Balance, GraduationRecord, StakingPool, TempleAchievement, TemplePhase,
    Token, TokenReward, Trade, UserStake,
};
use crate::store::{
    apply_balance_delta, apply_stake_delta, check_version, claim_spot, mark_reward_distributed,
    take_allocation, LedgerStore, StakeCommit, TradeCommit,
};

// Tree name is protocol. Changing it orphans existing data.
const TREE_LEDGER: &str = "launchpad_ledger";

type TxResult<T> = Result<T, ConflictableTransactionError<LedgerError>>;

fn abort(e: LedgerError) -> ConflictableTransactionError<LedgerError> {
    ConflictableTransactionError::Abort(e)
}

fn tx_get<T: DeserializeOwned>(tx: &TransactionalTree, key: &[u8]) -> TxResult<Option<T>> {
    match tx.get(key)? {
        Some(bytes) => bincode::deserialize(&bytes)
            .map(Some)
            .map_err(|e| abort(e.into())),
        None => Ok(None),
    }
}

fn tx_put<T: Serialize>(tx: &TransactionalTree, key: &[u8], value: &T) -> TxResult<()> {
    let bytes = bincode::serialize(value).map_err(|e| abort(e.into()))?;
    tx.insert(key, bytes)?;
    Ok(())
}

fn finish<T>(result: TransactionResult<T, LedgerError>) -> LedgerResult<T> {
    result.map_err(|e| match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => e.into(),
    })
}

/// Sled-backed ledger
pub struct SledLedger {
    db: Db,
    tree: Tree,
}

impl std::fmt::Debug for SledLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledLedger")
            .field("records", &self.tree.len())
            .finish_non_exhaustive()
    }
}

impl SledLedger {
    /// Open or create a ledger at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
        let db = sled::open(path.as_ref())?;
        let tree = db.open_tree(TREE_LEDGER)?;
        debug!(path = %path.as_ref().display(), records = tree.len(), "Opened sled ledger");
        Ok(Self { db, tree })
    }

    /// Open a temporary store (for testing)
    #[cfg(test)]
    pub fn open_temporary() -> LedgerResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        let tree = db.open_tree(TREE_LEDGER)?;
        Ok(Self { db, tree })
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> LedgerResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, key: &[u8]) -> LedgerResult<Option<T>> {
        match self.tree.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, prefix: &[u8]) -> LedgerResult<Vec<T>> {
        self.tree
            .scan_prefix(prefix)
            .map(|entry| -> LedgerResult<T> {
                let (_, bytes) = entry?;
                Ok(bincode::deserialize(&bytes)?)
            })
            .collect()
    }
}

impl LedgerStore for SledLedger {
    fn insert_token(&self, token: Token, reward: TokenReward) -> LedgerResult<()> {
        let token_key = keys::token_key(&token.id);
        finish(self.tree.transaction(|tx| -> TxResult<()> {
            if tx.get(&token_key)?.is_some() {
                return Err(abort(LedgerError::TokenExists(token.id)));
            }
            let mut pool: StakingPool = tx_get(tx, &keys::pool_key())?.unwrap_or_default();
            pool.token_rewards.push(reward.clone());
            tx_put(tx, &token_key, &token)?;
            tx_put(tx, &keys::pool_key(), &pool)?;
            Ok(())
        }))
    }

    fn get_token(&self, id: &TokenId) -> LedgerResult<Option<Token>> {
        self.read(&keys::token_key(id))
    }

    fn list_tokens(&self) -> LedgerResult<Vec<Token>> {
        let mut tokens: Vec<Token> = self.scan(&[keys::TOKEN])?;
        tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tokens)
    }

    fn get_balance(&self, user: &UserId, token: &TokenId) -> LedgerResult<Amount> {
        let balance: Option<Balance> = self.read(&keys::balance_key(token, user))?;
        Ok(balance.map_or(0.0, |b| b.amount))
    }

    fn holders(&self, token: &TokenId) -> LedgerResult<Vec<Balance>> {
        let balances: Vec<Balance> = self.scan(&keys::balance_prefix(token))?;
        Ok(balances
            .into_iter()
            .filter(|b| b.amount > AMOUNT_EPSILON)
            .collect())
    }

    fn commit_trade(&self, commit: TradeCommit) -> LedgerResult<Token> {
        let token_key = keys::token_key(&commit.token.id);
        let balance_key = keys::balance_key(&commit.token.id, &commit.trade.user);
        let trade_key = keys::trade_key(&commit.token.id, commit.expected_version + 1);

        finish(self.tree.transaction(|tx| -> TxResult<Token> {
            let current: Token = tx_get(tx, &token_key)?
                .ok_or_else(|| abort(LedgerError::TokenNotFound(commit.token.id)))?;
            check_version(Entity::Token, Some(commit.expected_version), Some(current.version))
                .map_err(abort)?;

            let have = tx_get::<Balance>(tx, &balance_key)?.map_or(0.0, |b| b.amount);
            let next = apply_balance_delta(have, commit.balance_delta, commit.balance_cap)
                .map_err(abort)?;

            let mut pool: StakingPool = tx_get(tx, &keys::pool_key())?.unwrap_or_default();
            pool.total_sol_rewards += commit.fee;

            let mut token = commit.token.clone();
            token.version = commit.expected_version + 1;

            let balance = Balance {
                user: commit.trade.user,
                token: token.id,
                amount: next,
            };
            tx_put(tx, &token_key, &token)?;
            tx_put(tx, &balance_key, &balance)?;
            tx_put(tx, &keys::pool_key(), &pool)?;
            tx_put(tx, &trade_key, &commit.trade)?;
            Ok(token)
        }))
    }

    fn trades_for_token(&self, token: &TokenId, limit: usize) -> LedgerResult<Vec<Trade>> {
        self.tree
            .scan_prefix(keys::trade_prefix(token))
            .rev()
            .take(limit)
            .map(|entry| -> LedgerResult<Trade> {
                let (_, bytes) = entry?;
                Ok(bincode::deserialize(&bytes)?)
            })
            .collect()
    }

    fn staking_pool(&self) -> LedgerResult<StakingPool> {
        Ok(self.read(&keys::pool_key())?.unwrap_or_default())
    }

    fn get_user_stake(&self, user: &UserId) -> LedgerResult<Option<UserStake>> {
        self.read(&keys::stake_key(user))
    }

    fn list_user_stakes(&self) -> LedgerResult<Vec<UserStake>> {
        self.scan(&[keys::STAKE])
    }

    fn commit_stake(&self, commit: StakeCommit) -> LedgerResult<UserStake> {
        let stake_key = keys::stake_key(&commit.stake.user);
        finish(self.tree.transaction(|tx| -> TxResult<UserStake> {
            let found = tx_get::<UserStake>(tx, &stake_key)?.map(|s| s.version);
            check_version(Entity::UserStake, commit.expected_version, found).map_err(abort)?;

            let mut pool: StakingPool = tx_get(tx, &keys::pool_key())?.unwrap_or_default();
            pool.total_staked =
                apply_stake_delta(pool.total_staked, commit.staked_delta).map_err(abort)?;

            let mut stake = commit.stake.clone();
            stake.version = commit.expected_version.map_or(1, |v| v + 1);
            tx_put(tx, &stake_key, &stake)?;
            tx_put(tx, &keys::pool_key(), &pool)?;
            Ok(stake)
        }))
    }

    fn get_graduation(&self, token: &TokenId) -> LedgerResult<Option<GraduationRecord>> {
        self.read(&keys::graduation_key(token))
    }

    fn insert_graduation(&self, record: GraduationRecord) -> LedgerResult<GraduationRecord> {
        let key = keys::graduation_key(&record.token);
        finish(self.tree.transaction(|tx| -> TxResult<GraduationRecord> {
            if let Some(existing) = tx_get::<GraduationRecord>(tx, &key)? {
                return Ok(existing);
            }
            tx_put(tx, &key, &record)?;
            Ok(record.clone())
        }))
    }

    fn credit_airdrop(
        &self,
        token: &TokenId,
        user: &UserId,
        received_at: DateTime<Utc>,
    ) -> LedgerResult<bool> {
        let graduation_key = keys::graduation_key(token);
        let stake_key = keys::stake_key(user);
        let balance_key = keys::balance_key(token, user);

        finish(self.tree.transaction(|tx| -> TxResult<bool> {
            let mut record: GraduationRecord = tx_get(tx, &graduation_key)?
                .ok_or_else(|| abort(LedgerError::GraduationNotFound(*token)))?;
            let airdrop = match take_allocation(&mut record, user, received_at).map_err(abort)? {
                Some(airdrop) => airdrop,
                None => return Ok(false),
            };

            let mut balance: Balance = tx_get(tx, &balance_key)?.unwrap_or(Balance {
                user: *user,
                token: *token,
                amount: 0.0,
            });
            balance.amount += airdrop.amount;

            let mut stake: UserStake =
                tx_get(tx, &stake_key)?.unwrap_or_else(|| UserStake::empty(*user));
            stake.version += 1;
            stake.token_airdrops.push(airdrop);

            tx_put(tx, &balance_key, &balance)?;
            tx_put(tx, &stake_key, &stake)?;
            tx_put(tx, &graduation_key, &record)?;
            Ok(true)
        }))
    }

    fn complete_graduation(&self, token: &TokenId) -> LedgerResult<GraduationRecord> {
        let key = keys::graduation_key(token);
        finish(self.tree.transaction(|tx| -> TxResult<GraduationRecord> {
            let mut record: GraduationRecord = tx_get(tx, &key)?
                .ok_or_else(|| abort(LedgerError::GraduationNotFound(*token)))?;
            record.completed = true;

            let mut pool: StakingPool = tx_get(tx, &keys::pool_key())?.unwrap_or_default();
            mark_reward_distributed(&mut pool, token);

            tx_put(tx, &key, &record)?;
            tx_put(tx, &keys::pool_key(), &pool)?;
            Ok(record)
        }))
    }

    fn pending_graduations(&self) -> LedgerResult<Vec<GraduationRecord>> {
        let records: Vec<GraduationRecord> = self.scan(&[keys::GRADUATION])?;
        Ok(records.into_iter().filter(|g| !g.completed).collect())
    }

    fn insert_phase(&self, phase: TemplePhase) -> LedgerResult<()> {
        let phase_key = keys::phase_key(&phase.id);
        let number_key = keys::phase_number_key(phase.phase_number);
        finish(self.tree.transaction(|tx| -> TxResult<()> {
            if tx.get(&number_key)?.is_some() {
                return Err(abort(LedgerError::PhaseExists(phase.phase_number)));
            }
            tx_put(tx, &number_key, &phase.id)?;
            tx_put(tx, &phase_key, &phase)?;
            Ok(())
        }))
    }

    fn get_phase(&self, id: &PhaseId) -> LedgerResult<Option<TemplePhase>> {
        self.read(&keys::phase_key(id))
    }

    fn list_phases(&self) -> LedgerResult<Vec<TemplePhase>> {
        let mut phases: Vec<TemplePhase> = self.scan(&[keys::PHASE])?;
        phases.sort_by_key(|p| p.phase_number);
        Ok(phases)
    }

    fn get_achievement(&self, key: &AchievementKey) -> LedgerResult<Option<TempleAchievement>> {
        self.read(&keys::achievement_key(key))
    }

    fn list_achievements(&self, phase: Option<&PhaseId>) -> LedgerResult<Vec<TempleAchievement>> {
        match phase {
            Some(phase) => self.scan(&keys::achievement_prefix(phase)),
            None => self.scan(&[keys::ACHIEVEMENT]),
        }
    }

    fn put_achievement(
        &self,
        achievement: TempleAchievement,
        expected_version: Option<u64>,
    ) -> LedgerResult<TempleAchievement> {
        let key = keys::achievement_key(&achievement.key());
        finish(self.tree.transaction(|tx| -> TxResult<TempleAchievement> {
            let found = tx_get::<TempleAchievement>(tx, &key)?.map(|a| a.version);
            check_version(Entity::Achievement, expected_version, found).map_err(abort)?;

            let mut stored = achievement.clone();
            stored.version = expected_version.map_or(1, |v| v + 1);
            tx_put(tx, &key, &stored)?;
            Ok(stored)
        }))
    }

    fn award_achievement(
        &self,
        achievement: TempleAchievement,
        expected_version: u64,
    ) -> LedgerResult<TempleAchievement> {
        let key = keys::achievement_key(&achievement.key());
        let phase_key = keys::phase_key(&achievement.phase);
        finish(self.tree.transaction(|tx| -> TxResult<TempleAchievement> {
            let found = tx_get::<TempleAchievement>(tx, &key)?.map(|a| a.version);
            check_version(Entity::Achievement, Some(expected_version), found).map_err(abort)?;

            let mut phase: TemplePhase = tx_get(tx, &phase_key)?
                .ok_or_else(|| abort(LedgerError::PhaseNotFound(achievement.phase)))?;
            let spot = claim_spot(&mut phase, achievement.tier).map_err(abort)?;

            let mut stored = achievement.clone();
            stored.spot_number = spot;
            stored.version = expected_version + 1;
            tx_put(tx, &phase_key, &phase)?;
            tx_put(tx, &key, &stored)?;
            Ok(stored)
        }))
    }
}
