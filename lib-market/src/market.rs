//! Bonding Curve Market
//!
//! Launches tokens and executes trades against their virtual reserves.
//!
//! Each trade is an optimistic read-compute-commit cycle on the token's
//! version. A commit that lost a race is recomputed from fresh reserves, up
//! to `max_commit_attempts` times, so two trades never price off the same
//! pre-trade state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use lib_ledger::{LedgerStore, Token, TokenReward, Trade, TradeCommit, TradeSide};
use lib_types::{Amount, AuthenticatedUser, Clock, TokenId, TradeId, AMOUNT_EPSILON};

use crate::config::MarketConfig;
use crate::curve::{self, BuyQuote, Reserves, SellQuote};
use crate::errors::{MarketError, MarketResult};
use crate::fees::FeeRouter;
use crate::graduation::GraduationCoordinator;

/// Default page size of trade history
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Maximum symbol length
pub const MAX_SYMBOL_LEN: usize = 10;

/// Parameters of a new token
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub name: String,
    pub symbol: String,
    pub description: String,
    pub max_wallet_limit: Option<Amount>,
    /// SOL the creator buys with at launch
    pub initial_buy: Option<Amount>,
}

/// Outcome of a launch
#[derive(Debug, Clone)]
pub struct LaunchReceipt {
    /// Token state after launch and initial buy
    pub token: Token,
    pub initial_buy: Option<TradeReceipt>,
}

/// Outcome of a committed trade
#[derive(Debug, Clone)]
pub struct TradeReceipt {
    pub trade: Trade,
    /// Token state as committed by this trade
    pub token: Token,
    /// This trade graduated the token
    pub graduated: bool,
}

impl TradeReceipt {
    /// Tokens bought, or tokens sold
    pub fn tokens(&self) -> Amount {
        self.trade.token_amount
    }

    /// SOL paid on a buy, SOL received on a sell
    pub fn sol(&self) -> Amount {
        self.trade.sol_amount
    }

    pub fn new_progress(&self) -> f64 {
        self.token.bonding_curve_progress
    }

    pub fn new_market_cap(&self) -> Amount {
        self.token.market_cap
    }
}

fn reserves(token: &Token) -> Reserves {
    Reserves::new(token.virtual_sol_reserves, token.virtual_token_reserves)
}

/// Constant-product market over every launched token
pub struct BondingCurveMarket {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    config: MarketConfig,
    router: FeeRouter,
    graduation: GraduationCoordinator,
}

impl std::fmt::Debug for BondingCurveMarket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BondingCurveMarket")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BondingCurveMarket {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        config: MarketConfig,
    ) -> MarketResult<Self> {
        config.validate()?;
        let graduation = GraduationCoordinator::new(store.clone(), clock.clone(), &config);
        Ok(Self {
            router: FeeRouter::new(config.trade_fee_rate),
            store,
            clock,
            config,
            graduation,
        })
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn graduation(&self) -> &GraduationCoordinator {
        &self.graduation
    }

    // =========================================================================
    // Launch
    // =========================================================================

    /// Create a token on a fresh curve, optionally with the creator's first buy
    pub fn launch(
        &self,
        creator: &AuthenticatedUser,
        request: LaunchRequest,
    ) -> MarketResult<LaunchReceipt> {
        let name = request.name.trim().to_string();
        let symbol = request.symbol.trim().to_string();
        if name.is_empty() {
            return Err(MarketError::InvalidParameters("Name cannot be empty".into()));
        }
        if symbol.is_empty() {
            return Err(MarketError::InvalidParameters("Symbol cannot be empty".into()));
        }
        if symbol.chars().count() > MAX_SYMBOL_LEN {
            return Err(MarketError::InvalidParameters(format!(
                "Symbol too long (max {})",
                MAX_SYMBOL_LEN
            )));
        }
        if let Some(limit) = request.max_wallet_limit {
            curve::require_positive(limit, "Wallet limit")?;
        }

        let initial = Reserves::new(self.config.initial_virtual_sol, self.config.initial_virtual_tokens);
        if let Some(sol) = request.initial_buy {
            // reject before anything is written
            let quote = curve::quote_buy(initial, sol, &self.router)?;
            if let Some(limit) = request.max_wallet_limit {
                if quote.tokens_out > limit + AMOUNT_EPSILON {
                    return Err(MarketError::WalletLimitExceeded {
                        limit,
                        would_have: quote.tokens_out,
                    });
                }
            }
        }

        let token = Token {
            id: TokenId::new(),
            name,
            symbol,
            description: request.description,
            creator: creator.user_id(),
            total_supply: self.config.total_supply,
            virtual_sol_reserves: initial.sol,
            virtual_token_reserves: initial.tokens,
            bonding_curve_progress: self.config.progress(initial.sol),
            market_cap: self.config.market_cap(initial.sol),
            is_graduated: false,
            graduated_at: None,
            migration_ref: None,
            max_wallet_limit: request.max_wallet_limit,
            creator_buy_amount: request.initial_buy.unwrap_or(0.0),
            created_at: self.clock.now(),
            version: 0,
        };
        let reward = TokenReward {
            token: token.id,
            symbol: token.symbol.clone(),
            amount: self.config.staker_allocation(),
            distributed: false,
        };
        self.store.insert_token(token.clone(), reward)?;
        info!(
            token = %token.id,
            symbol = %token.symbol,
            creator = %token.creator,
            staker_allocation = self.config.staker_allocation(),
            "Token launched"
        );

        match request.initial_buy {
            Some(sol) => {
                let receipt = self.buy(creator, &token.id, sol)?;
                Ok(LaunchReceipt {
                    token: receipt.token.clone(),
                    initial_buy: Some(receipt),
                })
            }
            None => Ok(LaunchReceipt {
                token,
                initial_buy: None,
            }),
        }
    }

    // =========================================================================
    // Quotes
    // =========================================================================

    pub fn quote_buy(&self, token_id: &TokenId, sol_amount: Amount) -> MarketResult<BuyQuote> {
        let token = self.load_open(token_id)?;
        curve::quote_buy(reserves(&token), sol_amount, &self.router)
    }

    pub fn quote_sell(&self, token_id: &TokenId, token_amount: Amount) -> MarketResult<SellQuote> {
        let token = self.load_open(token_id)?;
        curve::quote_sell(reserves(&token), token_amount, &self.router)
    }

    // =========================================================================
    // Trades
    // =========================================================================

    /// Spend `sol_amount` (fee included) on `token_id`
    pub fn buy(
        &self,
        user: &AuthenticatedUser,
        token_id: &TokenId,
        sol_amount: Amount,
    ) -> MarketResult<TradeReceipt> {
        curve::require_positive(sol_amount, "SOL amount")?;
        let receipt = self.with_retry("buy", token_id, || self.try_buy(user, token_id, sol_amount))?;

        debug!(
            token = %token_id,
            user = %user.user_id(),
            sol = sol_amount,
            tokens = receipt.trade.token_amount,
            fee = receipt.trade.fee,
            progress = receipt.token.bonding_curve_progress,
            "Buy committed"
        );
        if receipt.graduated {
            self.finish_graduation(&receipt.token);
        }
        Ok(receipt)
    }

    /// Sell `token_amount` of `token_id` back to the curve
    pub fn sell(
        &self,
        user: &AuthenticatedUser,
        token_id: &TokenId,
        token_amount: Amount,
    ) -> MarketResult<TradeReceipt> {
        curve::require_positive(token_amount, "Token amount")?;
        let receipt =
            self.with_retry("sell", token_id, || self.try_sell(user, token_id, token_amount))?;

        debug!(
            token = %token_id,
            user = %user.user_id(),
            tokens = token_amount,
            sol = receipt.trade.sol_amount,
            fee = receipt.trade.fee,
            progress = receipt.token.bonding_curve_progress,
            "Sell committed"
        );
        Ok(receipt)
    }

    fn try_buy(
        &self,
        user: &AuthenticatedUser,
        token_id: &TokenId,
        sol_amount: Amount,
    ) -> MarketResult<TradeReceipt> {
        let token = self.load_open(token_id)?;
        let quote = curve::quote_buy(reserves(&token), sol_amount, &self.router)?;
        let buyer = user.user_id();

        if let Some(limit) = token.max_wallet_limit {
            let would_have = self.store.get_balance(&buyer, token_id)? + quote.tokens_out;
            if would_have > limit + AMOUNT_EPSILON {
                return Err(MarketError::WalletLimitExceeded { limit, would_have });
            }
        }

        let now = self.clock.now();
        let mut next = self.with_reserves(&token, quote.after);
        let graduated = self.graduation.mark_graduated(&mut next, now);

        let mut commit = TradeCommit {
            token: next,
            expected_version: token.version,
            trade: Trade {
                id: TradeId::new(),
                token: token.id,
                user: buyer,
                side: TradeSide::Buy,
                sol_amount,
                token_amount: quote.tokens_out,
                fee: 0.0,
                price_at_trade: sol_amount / quote.tokens_out,
                timestamp: now,
            },
            balance_delta: quote.tokens_out,
            balance_cap: token.max_wallet_limit,
            fee: 0.0,
        };
        self.router.route(&quote.sol, &mut commit);

        let trade = commit.trade.clone();
        let token = self.store.commit_trade(commit)?;
        Ok(TradeReceipt {
            trade,
            token,
            graduated,
        })
    }

    fn try_sell(
        &self,
        user: &AuthenticatedUser,
        token_id: &TokenId,
        token_amount: Amount,
    ) -> MarketResult<TradeReceipt> {
        let token = self.load_open(token_id)?;
        let seller = user.user_id();

        let have = self.store.get_balance(&seller, token_id)?;
        if have + AMOUNT_EPSILON < token_amount {
            return Err(MarketError::InsufficientBalance {
                have,
                need: token_amount,
            });
        }

        let quote = curve::quote_sell(reserves(&token), token_amount, &self.router)?;
        let now = self.clock.now();

        let mut commit = TradeCommit {
            token: self.with_reserves(&token, quote.after),
            expected_version: token.version,
            trade: Trade {
                id: TradeId::new(),
                token: token.id,
                user: seller,
                side: TradeSide::Sell,
                sol_amount: quote.sol.net,
                token_amount,
                fee: 0.0,
                price_at_trade: quote.sol.net / token_amount,
                timestamp: now,
            },
            balance_delta: -token_amount,
            balance_cap: None,
            fee: 0.0,
        };
        self.router.route(&quote.sol, &mut commit);

        let trade = commit.trade.clone();
        let token = self.store.commit_trade(commit)?;
        Ok(TradeReceipt {
            trade,
            token,
            graduated: false,
        })
    }

    fn with_retry<T>(
        &self,
        op: &'static str,
        token_id: &TokenId,
        mut attempt: impl FnMut() -> MarketResult<T>,
    ) -> MarketResult<T> {
        let attempts = self.config.max_commit_attempts;
        for n in 1..=attempts {
            match attempt() {
                Err(e) if e.is_conflict() => {
                    warn!(op, token = %token_id, attempt = n, "Trade commit conflicted, retrying");
                }
                other => return other,
            }
        }
        Err(MarketError::Conflict { attempts })
    }

    /// Post-trade token state for new reserves
    fn with_reserves(&self, token: &Token, after: Reserves) -> Token {
        let mut next = token.clone();
        next.virtual_sol_reserves = after.sol;
        next.virtual_token_reserves = after.tokens;
        next.bonding_curve_progress = self.config.progress(after.sol);
        next.market_cap = self.config.market_cap(after.sol);
        next
    }

    fn finish_graduation(&self, token: &Token) {
        info!(
            token = %token.id,
            migration_ref = token.migration_ref.as_deref().unwrap_or_default(),
            sol_reserves = token.virtual_sol_reserves,
            "Token graduated, curve frozen"
        );
        if let Err(e) = self.graduation.distribute(token) {
            error!(token = %token.id, error = %e, "Graduation airdrop interrupted, left for resume");
        }
    }

    fn load_open(&self, token_id: &TokenId) -> MarketResult<Token> {
        let token = self.get_token(token_id)?;
        if token.is_graduated {
            return Err(MarketError::MarketClosed(token.id));
        }
        Ok(token)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn get_token(&self, token_id: &TokenId) -> MarketResult<Token> {
        self.store
            .get_token(token_id)?
            .ok_or(MarketError::TokenNotFound(*token_id))
    }

    /// All tokens, newest first
    pub fn list_tokens(&self) -> MarketResult<Vec<Token>> {
        Ok(self.store.list_tokens()?)
    }

    /// Recent trades of a token, newest first
    pub fn trade_history(&self, token_id: &TokenId, limit: Option<usize>) -> MarketResult<Vec<Trade>> {
        self.get_token(token_id)?;
        Ok(self
            .store
            .trades_for_token(token_id, limit.unwrap_or(DEFAULT_HISTORY_LIMIT))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_ledger::{MemoryLedger, StakeCommit, UserStake};
    use lib_types::{ManualClock, UserId};

    fn setup(config: MarketConfig) -> (Arc<MemoryLedger>, BondingCurveMarket) {
        let store = Arc::new(MemoryLedger::new());
        let market =
            BondingCurveMarket::new(store.clone(), Arc::new(ManualClock::default()), config)
                .unwrap();
        (store, market)
    }

    fn user() -> AuthenticatedUser {
        AuthenticatedUser::new(UserId::new())
    }

    fn launch(market: &BondingCurveMarket, creator: &AuthenticatedUser) -> Token {
        market
            .launch(
                creator,
                LaunchRequest {
                    name: "Test Token".into(),
                    symbol: "TEST".into(),
                    ..LaunchRequest::default()
                },
            )
            .unwrap()
            .token
    }

    #[test]
    fn test_launch_allocates_staker_reward() {
        let (store, market) = setup(MarketConfig::default());
        let token = launch(&market, &user());

        assert_eq!(token.virtual_sol_reserves, 30.0);
        assert_eq!(token.virtual_token_reserves, 1_000_000_000.0);
        assert_eq!(token.market_cap, 6_000.0);
        let pool = store.staking_pool().unwrap();
        assert_eq!(pool.token_rewards.len(), 1);
        assert_eq!(pool.token_rewards[0].amount, 50_000_000.0);
    }

    #[test]
    fn test_launch_validation() {
        let (_, market) = setup(MarketConfig::default());
        let creator = user();
        let bad_symbol = LaunchRequest {
            name: "x".into(),
            symbol: "WAYTOOLONGSYM".into(),
            ..LaunchRequest::default()
        };
        assert!(matches!(
            market.launch(&creator, bad_symbol),
            Err(MarketError::InvalidParameters(_))
        ));

        let no_name = LaunchRequest {
            symbol: "OK".into(),
            ..LaunchRequest::default()
        };
        assert!(market.launch(&creator, no_name).is_err());
        assert!(market.list_tokens().unwrap().is_empty());
    }

    #[test]
    fn test_launch_with_initial_buy() {
        let (store, market) = setup(MarketConfig::default());
        let creator = user();
        let receipt = market
            .launch(
                &creator,
                LaunchRequest {
                    name: "Creator Coin".into(),
                    symbol: "CC".into(),
                    initial_buy: Some(1.0),
                    ..LaunchRequest::default()
                },
            )
            .unwrap();

        let buy = receipt.initial_buy.unwrap();
        assert_eq!(receipt.token.creator_buy_amount, 1.0);
        assert!((receipt.token.virtual_sol_reserves - 30.998).abs() < 1e-9);
        assert_eq!(
            store.get_balance(&creator.user_id(), &receipt.token.id).unwrap(),
            buy.tokens()
        );
    }

    #[test]
    fn test_reference_buy_scenario() {
        let (store, market) = setup(MarketConfig::default());
        let token = launch(&market, &user());
        let buyer = user();

        let receipt = market.buy(&buyer, &token.id, 1.0).unwrap();
        assert!((receipt.tokens() - 32_195_625.524).abs() < 1e-2);
        assert!((receipt.token.virtual_sol_reserves - 30.998).abs() < 1e-12);
        assert!((receipt.trade.fee - 0.002).abs() < 1e-15);
        assert_eq!(receipt.trade.sol_amount, 1.0);
        assert!((receipt.new_market_cap() - 30.998 * 200.0).abs() < 1e-9);
        assert!((receipt.new_progress() - 0.998 / 85.0 * 100.0).abs() < 1e-9);
        assert!((store.staking_pool().unwrap().total_sol_rewards - 0.002).abs() < 1e-15);
    }

    #[test]
    fn test_sell_requires_balance() {
        let (_, market) = setup(MarketConfig::default());
        let token = launch(&market, &user());
        let seller = user();

        assert!(matches!(
            market.sell(&seller, &token.id, 10.0),
            Err(MarketError::InsufficientBalance { .. })
        ));

        let bought = market.buy(&seller, &token.id, 2.0).unwrap().tokens();
        let sold = market.sell(&seller, &token.id, bought).unwrap();
        assert!(sold.sol() < 2.0);
        assert_eq!(sold.trade.side, TradeSide::Sell);
        assert!((sold.trade.fee - (sold.sol() + sold.trade.fee) * 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_wallet_limit_blocks_buy() {
        let (store, market) = setup(MarketConfig::default());
        let creator = user();
        let token = market
            .launch(
                &creator,
                LaunchRequest {
                    name: "Capped".into(),
                    symbol: "CAP".into(),
                    max_wallet_limit: Some(10_000_000.0),
                    ..LaunchRequest::default()
                },
            )
            .unwrap()
            .token;
        let buyer = user();

        let err = market.buy(&buyer, &token.id, 1.0).unwrap_err();
        assert!(matches!(err, MarketError::WalletLimitExceeded { .. }));
        // nothing moved
        let after = market.get_token(&token.id).unwrap();
        assert_eq!(after.version, 0);
        assert_eq!(after.virtual_sol_reserves, 30.0);
        assert_eq!(store.staking_pool().unwrap().total_sol_rewards, 0.0);

        assert!(market.buy(&buyer, &token.id, 0.1).is_ok());
    }

    #[test]
    fn test_graduation_freezes_market_and_airdrops() {
        let (store, market) = setup(MarketConfig::for_testing());
        let token = launch(&market, &user());

        let staker = UserId::new();
        let mut stake = UserStake::empty(staker);
        stake.staked_amount = 1_000_000.0;
        store
            .commit_stake(StakeCommit {
                stake,
                expected_version: None,
                staked_delta: 1_000_000.0,
            })
            .unwrap();

        let buyer = user();
        let receipt = market.buy(&buyer, &token.id, 6.0).unwrap();
        assert!(receipt.graduated);
        assert!(receipt.token.is_graduated);
        assert_eq!(receipt.new_progress(), 100.0);

        assert!(matches!(
            market.buy(&buyer, &token.id, 1.0),
            Err(MarketError::MarketClosed(_))
        ));
        assert!(matches!(
            market.sell(&buyer, &token.id, 1.0),
            Err(MarketError::MarketClosed(_))
        ));
        assert!((store.get_balance(&staker, &token.id).unwrap() - 50_000_000.0).abs() < 1e-6);
        assert!(store.get_graduation(&token.id).unwrap().unwrap().completed);
    }

    #[test]
    fn test_history_newest_first() {
        let (_, market) = setup(MarketConfig::default());
        let token = launch(&market, &user());
        let trader = user();
        market.buy(&trader, &token.id, 1.0).unwrap();
        market.sell(&trader, &token.id, 1_000.0).unwrap();

        let history = market.trade_history(&token.id, None).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].side, TradeSide::Sell);
        assert_eq!(market.trade_history(&token.id, Some(1)).unwrap().len(), 1);
        assert!(matches!(
            market.trade_history(&TokenId::new(), None),
            Err(MarketError::TokenNotFound(_))
        ));
    }

    #[test]
    fn test_concurrent_buys_never_share_reserves() {
        let (store, market) = setup(MarketConfig::default());
        let market = Arc::new(market);
        let token = launch(&market, &user());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let market = market.clone();
                let token_id = token.id;
                std::thread::spawn(move || market.buy(&user(), &token_id, 1.0).unwrap())
            })
            .collect();
        let bought: f64 = handles.into_iter().map(|h| h.join().unwrap().tokens()).sum();

        let after = market.get_token(&token.id).unwrap();
        assert_eq!(after.version, 8);
        assert!((after.virtual_sol_reserves - (30.0 + 8.0 * 0.998)).abs() < 1e-9);
        assert!((after.virtual_token_reserves + bought - 1_000_000_000.0).abs() < 1e-3);
        assert!((store.staking_pool().unwrap().total_sol_rewards - 8.0 * 0.002).abs() < 1e-12);
        assert_eq!(market.trade_history(&token.id, None).unwrap().len(), 8);
    }
}
