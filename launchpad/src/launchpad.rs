//! Launchpad Facade
//!
//! The single entry point the transport layer talks to. It resolves the
//! caller, dispatches to the engines and runs the post-trade hooks:
//!
//! ```text
//!   buy/sell ─▶ BondingCurveMarket ─▶ commit ─┬─▶ GraduationCoordinator (if graduated)
//!                                             └─▶ TempleAchievementEngine
//! ```
//!
//! A committed trade is never rolled back by a failing hook. Graduation
//! resumes from its record and temple timers are picked up by [`Launchpad::sweep`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use lib_ledger::{
    GraduationRecord, LedgerStore, PendingWithdrawal, TempleAchievement, TemplePhase, Token, Trade,
    UserStake,
};
use lib_market::{
    BondingCurveMarket, BuyQuote, LaunchReceipt, LaunchRequest, SellQuote, TradeReceipt,
};
use lib_staking::{InstantWithdrawal, PoolStats, RewardAccrual, RewardSummary, StakingLedger};
use lib_temple::{PhaseRequest, PhaseStatus, TempleAchievementEngine, TierEvaluation, TierOutcome};
use lib_types::{Amount, Caller, Clock, PhaseId, TokenId};

use crate::config::LaunchpadConfig;
use crate::errors::LaunchpadResult;

/// What one sweep did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub temple: Vec<TierEvaluation>,
    pub graduations: Vec<GraduationRecord>,
}

impl SweepReport {
    pub fn awarded(&self) -> usize {
        self.temple
            .iter()
            .filter(|e| matches!(e.outcome, TierOutcome::Achieved { .. }))
            .count()
    }
}

pub struct Launchpad {
    store: Arc<dyn LedgerStore>,
    market: BondingCurveMarket,
    staking: StakingLedger,
    rewards: RewardAccrual,
    temple: TempleAchievementEngine,
}

impl std::fmt::Debug for Launchpad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Launchpad")
            .field("store", &self.store)
            .field("market", &self.market)
            .field("staking", &self.staking)
            .field("temple", &self.temple)
            .finish()
    }
}

impl Launchpad {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        config: &LaunchpadConfig,
    ) -> LaunchpadResult<Self> {
        let market = BondingCurveMarket::new(store.clone(), clock.clone(), config.market.clone())?;
        let staking = StakingLedger::new(store.clone(), clock.clone(), config.staking.clone())?;
        let rewards = RewardAccrual::new(store.clone(), &config.staking);
        let temple = TempleAchievementEngine::new(store.clone(), clock, config.temple.clone())?;
        Ok(Self {
            store,
            market,
            staking,
            rewards,
            temple,
        })
    }

    pub fn market(&self) -> &BondingCurveMarket {
        &self.market
    }

    pub fn temple(&self) -> &TempleAchievementEngine {
        &self.temple
    }

    // =========================================================================
    // Market
    // =========================================================================

    pub fn launch_token(
        &self,
        caller: &Caller,
        request: LaunchRequest,
    ) -> LaunchpadResult<LaunchReceipt> {
        let creator = caller.require()?;
        let receipt = self.market.launch(&creator, request)?;
        if receipt.initial_buy.is_some() {
            self.after_trade(&receipt.token);
        }
        Ok(receipt)
    }

    /// Spend `sol_amount` SOL, fee included
    pub fn buy(
        &self,
        caller: &Caller,
        token: &TokenId,
        sol_amount: Amount,
    ) -> LaunchpadResult<TradeReceipt> {
        let user = caller.require()?;
        let receipt = self.market.buy(&user, token, sol_amount)?;
        self.after_trade(&receipt.token);
        Ok(receipt)
    }

    pub fn sell(
        &self,
        caller: &Caller,
        token: &TokenId,
        token_amount: Amount,
    ) -> LaunchpadResult<TradeReceipt> {
        let user = caller.require()?;
        let receipt = self.market.sell(&user, token, token_amount)?;
        self.after_trade(&receipt.token);
        Ok(receipt)
    }

    pub fn quote_buy(&self, token: &TokenId, sol_amount: Amount) -> LaunchpadResult<BuyQuote> {
        Ok(self.market.quote_buy(token, sol_amount)?)
    }

    pub fn quote_sell(&self, token: &TokenId, token_amount: Amount) -> LaunchpadResult<SellQuote> {
        Ok(self.market.quote_sell(token, token_amount)?)
    }

    pub fn get_token(&self, token: &TokenId) -> LaunchpadResult<Token> {
        Ok(self.market.get_token(token)?)
    }

    pub fn list_tokens(&self) -> LaunchpadResult<Vec<Token>> {
        Ok(self.market.list_tokens()?)
    }

    /// Newest first, 50 by default
    pub fn trade_history(
        &self,
        token: &TokenId,
        limit: Option<usize>,
    ) -> LaunchpadResult<Vec<Trade>> {
        Ok(self.market.trade_history(token, limit)?)
    }

    pub fn balance(&self, caller: &Caller, token: &TokenId) -> LaunchpadResult<Amount> {
        let user = caller.require()?;
        Ok(self.store.get_balance(&user.user_id(), token)?)
    }

    /// Temple evaluation on the token state a trade just committed
    fn after_trade(&self, token: &Token) {
        match self.temple.evaluate_token(token) {
            Ok(evaluations) => {
                for e in evaluations.iter().filter(|e| e.outcome != TierOutcome::Unchanged) {
                    debug!(token = %e.token, tier = e.tier, outcome = ?e.outcome, "Temple evaluated");
                }
            }
            Err(e) => {
                error!(token = %token.id, error = %e, "Temple evaluation failed, left for sweep");
            }
        }
    }

    // =========================================================================
    // Staking
    // =========================================================================

    pub fn stake(&self, caller: &Caller, amount: Amount) -> LaunchpadResult<UserStake> {
        let user = caller.require()?;
        Ok(self.staking.stake(&user.user_id(), amount)?)
    }

    /// Withdraw now, less the instant withdrawal fee
    pub fn withdraw_instant(
        &self,
        caller: &Caller,
        amount: Amount,
    ) -> LaunchpadResult<InstantWithdrawal> {
        let user = caller.require()?;
        Ok(self.staking.withdraw_instant(&user.user_id(), amount)?)
    }

    /// Request a fee-free withdrawal, completable after the delay
    pub fn withdraw_standard(
        &self,
        caller: &Caller,
        amount: Amount,
    ) -> LaunchpadResult<PendingWithdrawal> {
        let user = caller.require()?;
        Ok(self.staking.withdraw_standard(&user.user_id(), amount)?)
    }

    pub fn cancel_withdrawal(&self, caller: &Caller) -> LaunchpadResult<()> {
        let user = caller.require()?;
        Ok(self.staking.cancel_withdrawal(&user.user_id())?)
    }

    pub fn complete_withdrawal(&self, caller: &Caller) -> LaunchpadResult<Amount> {
        let user = caller.require()?;
        Ok(self.staking.complete_withdrawal(&user.user_id())?)
    }

    pub fn claim_rewards(&self, caller: &Caller) -> LaunchpadResult<Amount> {
        let user = caller.require()?;
        Ok(self.rewards.claim(&user.user_id())?)
    }

    pub fn user_rewards(&self, caller: &Caller) -> LaunchpadResult<RewardSummary> {
        let user = caller.require()?;
        Ok(self.rewards.user_rewards(&user.user_id())?)
    }

    pub fn stake_position(&self, caller: &Caller) -> LaunchpadResult<UserStake> {
        let user = caller.require()?;
        Ok(self.staking.stake_position(&user.user_id())?)
    }

    pub fn pool_stats(&self) -> LaunchpadResult<PoolStats> {
        Ok(self.staking.pool_stats()?)
    }

    // =========================================================================
    // Temple
    // =========================================================================

    pub fn current_phase(&self) -> LaunchpadResult<Option<PhaseStatus>> {
        Ok(self.temple.phase_status()?)
    }

    /// Achievements of `phase`, or of the current phase when omitted
    pub fn achievements(
        &self,
        phase: Option<&PhaseId>,
    ) -> LaunchpadResult<Vec<TempleAchievement>> {
        Ok(self.temple.achievements(phase)?)
    }

    pub fn create_phase(
        &self,
        caller: &Caller,
        request: PhaseRequest,
    ) -> LaunchpadResult<TemplePhase> {
        let admin = caller.require()?;
        let phase = self.temple.create_phase(request)?;
        info!(phase = phase.phase_number, by = %admin.user_id(), "Phase registered");
        Ok(phase)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Finish every graduation airdrop left incomplete
    pub fn resume_pending_graduations(&self) -> LaunchpadResult<Vec<GraduationRecord>> {
        Ok(self.market.graduation().resume_pending()?)
    }

    /// Finish interrupted graduations and complete held temple timers
    ///
    /// Both halves run before either error is returned.
    pub fn sweep(&self) -> LaunchpadResult<SweepReport> {
        let graduations = self.resume_pending_graduations();
        let temple = self.temple.sweep();
        let report = SweepReport {
            graduations: graduations?,
            temple: temple?,
        };

        if !report.graduations.is_empty() || report.awarded() > 0 {
            info!(
                graduations = report.graduations.len(),
                awarded = report.awarded(),
                timers = report.temple.len(),
                "Sweep finished"
            );
        }
        Ok(report)
    }
}
