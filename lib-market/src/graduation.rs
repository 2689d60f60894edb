//! Graduation Coordinator
//!
//! Graduation is a one-way edge: `is_graduated` flips inside the trade commit
//! that pushes progress to 100, guarded by the token's version, so exactly one
//! trade ever observes it.
//!
//! The staker airdrop that follows spans many records and runs as a durable
//! plan instead:
//!
//! ```text
//!   plan (insert-if-absent) ─▶ credit each allocation ─▶ complete
//!          │                      (idempotent per user)
//!          └── a re-run replays the stored plan, never a new one
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use lib_ledger::{AirdropAllocation, GraduationRecord, LedgerStore, Token};
use lib_types::{Amount, Clock, TokenId, AMOUNT_EPSILON};

use crate::config::MarketConfig;
use crate::errors::{GraduationError, GraduationResult};

/// Drives the post-graduation airdrop to stakers
pub struct GraduationCoordinator {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    airdrop_rate: f64,
}

impl std::fmt::Debug for GraduationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraduationCoordinator")
            .field("airdrop_rate", &self.airdrop_rate)
            .finish_non_exhaustive()
    }
}

impl GraduationCoordinator {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>, config: &MarketConfig) -> Self {
        Self {
            store,
            clock,
            airdrop_rate: config.graduation_airdrop_rate,
        }
    }

    /// Simulated reference of the liquidity migration
    pub fn migration_ref(token: &TokenId) -> String {
        format!("migration-{}", token.as_uuid().simple())
    }

    /// Apply the graduation edge to a post-trade token state
    ///
    /// Returns true when this state is the one that graduates the token.
    pub fn mark_graduated(&self, token: &mut Token, now: DateTime<Utc>) -> bool {
        if token.is_graduated || token.bonding_curve_progress < 100.0 {
            return false;
        }
        token.is_graduated = true;
        token.graduated_at = Some(now);
        token.migration_ref = Some(Self::migration_ref(&token.id));
        true
    }

    /// Tokens airdropped to stakers when `token` graduates
    pub fn airdrop_pool(&self, token: &Token) -> Amount {
        token.total_supply * self.airdrop_rate
    }

    /// Run (or finish) the airdrop of a graduated token
    pub fn distribute(&self, token: &Token) -> GraduationResult<GraduationRecord> {
        if !token.is_graduated {
            return Err(GraduationError::NotGraduated(token.id));
        }

        let record = match self.store.get_graduation(&token.id)? {
            Some(record) => record,
            None => self.store.insert_graduation(self.plan(token)?)?,
        };
        if record.completed {
            return Ok(record);
        }

        let now = self.clock.now();
        let mut credited = 0usize;
        for allocation in record.pending_allocations() {
            if self.store.credit_airdrop(&record.token, &allocation.user, now)? {
                credited += 1;
            }
        }

        let record = self.store.complete_graduation(&token.id)?;
        info!(
            token = %token.id,
            symbol = %record.symbol,
            airdrop_pool = record.airdrop_pool,
            stakers = record.allocations.len(),
            credited,
            "Graduation airdrop distributed"
        );
        Ok(record)
    }

    /// Finish every graduation a crash or store failure left behind
    pub fn resume_pending(&self) -> GraduationResult<Vec<GraduationRecord>> {
        let mut stalled: Vec<Token> = Vec::new();

        for record in self.store.pending_graduations()? {
            let token = self
                .store
                .get_token(&record.token)?
                .ok_or(GraduationError::TokenNotFound(record.token))?;
            stalled.push(token);
        }
        for token in self.store.list_tokens()? {
            if token.is_graduated && self.store.get_graduation(&token.id)?.is_none() {
                stalled.push(token);
            }
        }

        let mut resumed = Vec::with_capacity(stalled.len());
        for token in stalled {
            warn!(token = %token.id, "Resuming interrupted graduation");
            resumed.push(self.distribute(&token)?);
        }
        Ok(resumed)
    }

    /// Allocate the airdrop pool pro rata over current stakers
    fn plan(&self, token: &Token) -> GraduationResult<GraduationRecord> {
        let stakers: Vec<_> = self
            .store
            .list_user_stakes()?
            .into_iter()
            .filter(|s| s.staked_amount > AMOUNT_EPSILON)
            .collect();
        let total_staked: Amount = stakers.iter().map(|s| s.staked_amount).sum();
        let airdrop_pool = self.airdrop_pool(token);

        let allocations = if total_staked > 0.0 {
            stakers
                .iter()
                .map(|s| AirdropAllocation {
                    user: s.user,
                    amount: airdrop_pool * (s.staked_amount / total_staked),
                    credited: false,
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(GraduationRecord {
            token: token.id,
            symbol: token.symbol.clone(),
            graduated_at: token.graduated_at.unwrap_or_else(|| self.clock.now()),
            migration_ref: token
                .migration_ref
                .clone()
                .unwrap_or_else(|| Self::migration_ref(&token.id)),
            airdrop_pool,
            total_staked_snapshot: total_staked,
            allocations,
            completed: false,
        })
    }
}
