//! Staking Ledger
//!
//! Deposits, the two withdrawal modes and the pending withdrawal lifecycle.
//!
//! ```text
//!   Unstaked ──stake──▶ Staked ──withdraw_standard──▶ Staked + Pending
//!                         │  ▲                          │        │
//!          withdraw_instant  └──────── cancel ──────────┘        │
//!          (penalised, immediate)       complete (after delay) ◀─┘
//! ```
//!
//! Every operation is a compare-and-swap of the user's stake together with
//! the pool total, retried on a lost race.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use lib_ledger::{LedgerStore, PendingWithdrawal, StakeCommit, TokenReward, UserStake};
use lib_types::{Amount, Clock, UserId, AMOUNT_EPSILON};

use crate::config::StakingConfig;
use crate::errors::{StakingError, StakingResult};

/// Settled instant withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstantWithdrawal {
    pub amount: Amount,
    pub fee: Amount,
    pub net_amount: Amount,
}

/// Aggregate view of the staking pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    pub total_staked: Amount,
    pub total_sol_rewards: Amount,
    pub token_rewards: Vec<TokenReward>,
    pub tokens_created: usize,
    pub tokens_graduated: usize,
}

pub(crate) fn with_retry<T>(
    attempts: u32,
    op: &'static str,
    user: &UserId,
    mut attempt: impl FnMut() -> StakingResult<T>,
) -> StakingResult<T> {
    for n in 1..=attempts {
        match attempt() {
            Err(e) if e.is_conflict() => {
                warn!(op, user = %user, attempt = n, "Stake commit conflicted, retrying");
            }
            other => return other,
        }
    }
    Err(StakingError::Conflict { attempts })
}

fn require_positive(amount: Amount) -> StakingResult<()> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(StakingError::InvalidAmount(format!(
            "amount must be a positive number, got {}",
            amount
        )))
    }
}

/// Manages user stakes against the single staking pool
pub struct StakingLedger {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    config: StakingConfig,
}

impl std::fmt::Debug for StakingLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StakingLedger")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StakingLedger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        config: StakingConfig,
    ) -> StakingResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            clock,
            config,
        })
    }

    pub fn config(&self) -> &StakingConfig {
        &self.config
    }

    /// Current stake and its version, `None` version when never staked
    fn load(&self, user: &UserId) -> StakingResult<(UserStake, Option<u64>)> {
        Ok(match self.store.get_user_stake(user)? {
            Some(stake) => {
                let version = stake.version;
                (stake, Some(version))
            }
            None => (UserStake::empty(*user), None),
        })
    }

    fn commit(
        &self,
        stake: UserStake,
        expected_version: Option<u64>,
        staked_delta: Amount,
    ) -> StakingResult<UserStake> {
        Ok(self.store.commit_stake(StakeCommit {
            stake,
            expected_version,
            staked_delta,
        })?)
    }

    // =========================================================================
    // Deposits
    // =========================================================================

    /// Deposit `amount` into the pool
    pub fn stake(&self, user: &UserId, amount: Amount) -> StakingResult<UserStake> {
        require_positive(amount)?;
        if amount < self.config.min_stake {
            return Err(StakingError::BelowMinimum {
                min: self.config.min_stake,
                got: amount,
            });
        }

        let stake = with_retry(self.config.max_commit_attempts, "stake", user, || {
            let (mut stake, version) = self.load(user)?;
            stake.staked_amount += amount;
            if stake.staked_at.is_none() {
                stake.staked_at = Some(self.clock.now());
            }
            self.commit(stake, version, amount)
        })?;

        info!(user = %user, amount, staked = stake.staked_amount, "Staked");
        Ok(stake)
    }

    // =========================================================================
    // Withdrawals
    // =========================================================================

    /// Withdraw immediately, paying the instant withdrawal penalty
    ///
    /// Cannot touch the part of the stake reserved by a pending withdrawal.
    pub fn withdraw_instant(&self, user: &UserId, amount: Amount) -> StakingResult<InstantWithdrawal> {
        require_positive(amount)?;

        with_retry(self.config.max_commit_attempts, "withdraw_instant", user, || {
            let (mut stake, version) = self.load(user)?;
            let available = stake.unreserved_amount();
            if amount > available + AMOUNT_EPSILON {
                return Err(StakingError::InsufficientStake {
                    available,
                    requested: amount,
                });
            }
            stake.staked_amount = (stake.staked_amount - amount).max(0.0);
            self.commit(stake, version, -amount)
        })?;

        let fee = amount * self.config.instant_withdrawal_fee_rate;
        let withdrawal = InstantWithdrawal {
            amount,
            fee,
            net_amount: amount - fee,
        };
        info!(user = %user, amount, fee, "Instant withdrawal settled");
        Ok(withdrawal)
    }

    /// Request a delayed, penalty-free withdrawal
    ///
    /// Funds stay staked, and keep earning, until completion.
    pub fn withdraw_standard(&self, user: &UserId, amount: Amount) -> StakingResult<PendingWithdrawal> {
        require_positive(amount)?;

        let stake = with_retry(self.config.max_commit_attempts, "withdraw_standard", user, || {
            let (mut stake, version) = self.load(user)?;
            if amount > stake.staked_amount + AMOUNT_EPSILON {
                return Err(StakingError::InsufficientStake {
                    available: stake.staked_amount,
                    requested: amount,
                });
            }
            if stake.pending_withdrawal.is_some() {
                return Err(StakingError::WithdrawalAlreadyPending);
            }
            let now = self.clock.now();
            stake.pending_withdrawal = Some(PendingWithdrawal::Standard {
                amount,
                requested_at: now,
                available_at: now + self.config.standard_withdrawal_delay(),
            });
            self.commit(stake, version, 0.0)
        })?;

        let pending = stake
            .pending_withdrawal
            .ok_or(StakingError::NoPendingWithdrawal)?;
        info!(user = %user, amount, "Standard withdrawal requested");
        Ok(pending)
    }

    /// Drop the pending withdrawal; balances are untouched
    pub fn cancel_withdrawal(&self, user: &UserId) -> StakingResult<()> {
        with_retry(self.config.max_commit_attempts, "cancel_withdrawal", user, || {
            let (mut stake, version) = self.load(user)?;
            if stake.pending_withdrawal.take().is_none() {
                return Err(StakingError::NoPendingWithdrawal);
            }
            self.commit(stake, version, 0.0)
        })?;

        info!(user = %user, "Withdrawal cancelled");
        Ok(())
    }

    /// Finalise a standard withdrawal whose delay has elapsed
    pub fn complete_withdrawal(&self, user: &UserId) -> StakingResult<Amount> {
        let withdrawn = with_retry(self.config.max_commit_attempts, "complete_withdrawal", user, || {
            let (mut stake, version) = self.load(user)?;
            let amount = match &stake.pending_withdrawal {
                None => return Err(StakingError::NoPendingWithdrawal),
                Some(PendingWithdrawal::Standard {
                    amount,
                    available_at,
                    ..
                }) => {
                    if self.clock.now() < *available_at {
                        return Err(StakingError::NotYetAvailable {
                            available_at: *available_at,
                        });
                    }
                    *amount
                }
                Some(other) => {
                    return Err(StakingError::InvalidType {
                        expected: "standard",
                        found: other.kind(),
                    })
                }
            };

            // an earlier instant withdrawal may have shrunk the stake below the request
            let amount = amount.min(stake.staked_amount);
            stake.staked_amount -= amount;
            stake.pending_withdrawal = None;
            self.commit(stake, version, -amount)?;
            Ok(amount)
        })?;

        info!(user = %user, withdrawn, "Standard withdrawal completed");
        Ok(withdrawn)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Stake of `user`, zeroed when they never staked
    pub fn stake_position(&self, user: &UserId) -> StakingResult<UserStake> {
        Ok(self.load(user)?.0)
    }

    pub fn pool_stats(&self) -> StakingResult<PoolStats> {
        let pool = self.store.staking_pool()?;
        let tokens = self.store.list_tokens()?;
        Ok(PoolStats {
            total_staked: pool.total_staked,
            total_sol_rewards: pool.total_sol_rewards,
            token_rewards: pool.token_rewards,
            tokens_created: tokens.len(),
            tokens_graduated: tokens.iter().filter(|t| t.is_graduated).count(),
        })
    }

    /// Available time of the user's pending standard withdrawal
    pub fn available_at(&self, user: &UserId) -> StakingResult<Option<DateTime<Utc>>> {
        Ok(match self.load(user)?.0.pending_withdrawal {
            Some(PendingWithdrawal::Standard { available_at, .. }) => Some(available_at),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use lib_ledger::MemoryLedger;
    use lib_types::ManualClock;

    const MIN: Amount = 1_000_000.0;

    fn setup() -> (Arc<MemoryLedger>, Arc<ManualClock>, StakingLedger) {
        let store = Arc::new(MemoryLedger::new());
        let clock = Arc::new(ManualClock::default());
        let ledger =
            StakingLedger::new(store.clone(), clock.clone(), StakingConfig::default()).unwrap();
        (store, clock, ledger)
    }

    fn sum_of_stakes(store: &MemoryLedger) -> Amount {
        store
            .list_user_stakes()
            .unwrap()
            .iter()
            .map(|s| s.staked_amount)
            .sum()
    }

    #[test]
    fn test_stake_below_minimum() {
        let (store, _, ledger) = setup();
        let user = UserId::new();
        assert!(matches!(
            ledger.stake(&user, MIN - 1.0),
            Err(StakingError::BelowMinimum { .. })
        ));
        assert!(store.get_user_stake(&user).unwrap().is_none());
    }

    #[test]
    fn test_staked_at_set_once() {
        let (store, clock, ledger) = setup();
        let user = UserId::new();
        let first = ledger.stake(&user, MIN).unwrap();
        clock.advance(Duration::hours(1));
        let second = ledger.stake(&user, MIN).unwrap();

        assert_eq!(second.staked_amount, 2.0 * MIN);
        assert_eq!(second.staked_at, first.staked_at);
        assert_eq!(store.staking_pool().unwrap().total_staked, 2.0 * MIN);
    }

    #[test]
    fn test_instant_withdrawal_penalty() {
        let (store, _, ledger) = setup();
        let user = UserId::new();
        ledger.stake(&user, 2.0 * MIN).unwrap();

        let out = ledger.withdraw_instant(&user, MIN).unwrap();
        assert_eq!(out.fee, MIN * 0.05);
        assert_eq!(out.net_amount, MIN * 0.95);
        assert_eq!(ledger.stake_position(&user).unwrap().staked_amount, MIN);
        assert!(ledger.stake_position(&user).unwrap().pending_withdrawal.is_none());
        assert_eq!(store.staking_pool().unwrap().total_staked, MIN);

        assert!(matches!(
            ledger.withdraw_instant(&user, 2.0 * MIN),
            Err(StakingError::InsufficientStake { .. })
        ));
    }

    #[test]
    fn test_instant_cannot_spend_reserved_amount() {
        let (_, _, ledger) = setup();
        let user = UserId::new();
        ledger.stake(&user, 3.0 * MIN).unwrap();
        ledger.withdraw_standard(&user, 2.0 * MIN).unwrap();

        assert!(matches!(
            ledger.withdraw_instant(&user, 2.0 * MIN),
            Err(StakingError::InsufficientStake { .. })
        ));
        assert!(ledger.withdraw_instant(&user, MIN).is_ok());
    }

    #[test]
    fn test_standard_withdrawal_lifecycle() {
        let (store, clock, ledger) = setup();
        let user = UserId::new();
        ledger.stake(&user, 2.0 * MIN).unwrap();

        let pending = ledger.withdraw_standard(&user, MIN).unwrap();
        let available_at = match pending {
            PendingWithdrawal::Standard { available_at, .. } => available_at,
            other => panic!("unexpected pending withdrawal {:?}", other),
        };
        assert_eq!(available_at, clock.now() + Duration::days(5));
        // still staked while pending
        assert_eq!(store.staking_pool().unwrap().total_staked, 2.0 * MIN);

        assert_eq!(
            ledger.withdraw_standard(&user, MIN),
            Err(StakingError::WithdrawalAlreadyPending)
        );

        clock.advance(Duration::days(5) - Duration::seconds(1));
        assert_eq!(
            ledger.complete_withdrawal(&user),
            Err(StakingError::NotYetAvailable { available_at })
        );

        clock.advance(Duration::seconds(1));
        assert_eq!(ledger.complete_withdrawal(&user).unwrap(), MIN);
        assert_eq!(
            ledger.complete_withdrawal(&user),
            Err(StakingError::NoPendingWithdrawal)
        );
        assert_eq!(store.staking_pool().unwrap().total_staked, MIN);
        assert_eq!(sum_of_stakes(&store), MIN);
    }

    #[test]
    fn test_cancel_withdrawal() {
        let (store, _, ledger) = setup();
        let user = UserId::new();
        assert_eq!(
            ledger.cancel_withdrawal(&user),
            Err(StakingError::NoPendingWithdrawal)
        );

        ledger.stake(&user, MIN).unwrap();
        ledger.withdraw_standard(&user, MIN).unwrap();
        ledger.cancel_withdrawal(&user).unwrap();

        let position = ledger.stake_position(&user).unwrap();
        assert!(position.pending_withdrawal.is_none());
        assert_eq!(position.staked_amount, MIN);
        assert_eq!(store.staking_pool().unwrap().total_staked, MIN);
    }

    #[test]
    fn test_complete_rejects_instant_pending_record() {
        let (store, clock, ledger) = setup();
        let user = UserId::new();
        let mut stake = ledger.stake(&user, MIN).unwrap();
        let version = stake.version;
        stake.pending_withdrawal = Some(PendingWithdrawal::Instant {
            amount: MIN,
            requested_at: clock.now(),
        });
        store
            .commit_stake(StakeCommit {
                stake,
                expected_version: Some(version),
                staked_delta: 0.0,
            })
            .unwrap();

        clock.advance(Duration::days(30));
        assert_eq!(
            ledger.complete_withdrawal(&user),
            Err(StakingError::InvalidType {
                expected: "standard",
                found: "instant",
            })
        );
        // left as it was
        let position = ledger.stake_position(&user).unwrap();
        assert_eq!(position.staked_amount, MIN);
        assert!(position.pending_withdrawal.is_some());
    }

    #[test]
    fn test_standard_withdrawal_over_stake() {
        let (_, _, ledger) = setup();
        let user = UserId::new();
        assert!(matches!(
            ledger.withdraw_standard(&user, MIN),
            Err(StakingError::InsufficientStake { .. })
        ));
        assert!(matches!(
            ledger.withdraw_standard(&user, -5.0),
            Err(StakingError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_pool_total_matches_stakes_under_contention() {
        let (store, _, ledger) = setup();
        let ledger = Arc::new(ledger);
        let users: Vec<UserId> = (0..4).map(|_| UserId::new()).collect();

        let mut handles = Vec::new();
        for user in &users {
            for _ in 0..3 {
                let ledger = ledger.clone();
                let user = *user;
                handles.push(std::thread::spawn(move || ledger.stake(&user, MIN).unwrap()));
            }
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.staking_pool().unwrap().total_staked, 12.0 * MIN);
        assert_eq!(sum_of_stakes(&store), 12.0 * MIN);
    }

    #[test]
    fn test_pool_stats_counts() {
        let (_, _, ledger) = setup();
        let user = UserId::new();
        ledger.stake(&user, MIN).unwrap();
        let stats = ledger.pool_stats().unwrap();
        assert_eq!(stats.total_staked, MIN);
        assert_eq!(stats.tokens_created, 0);
        assert_eq!(stats.tokens_graduated, 0);
    }
}
