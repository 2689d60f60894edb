//! Constant-Product Curve
//!
//! Pure pricing over virtual reserves `(X = sol, Y = token)` with `K = X·Y`.
//!
//! ```text
//!   buy:   ΔX = gross − fee          ΔY = Y − K / (X + ΔX)
//!   sell:  ΔX = X − K / (Y + ΔY)     paid out = ΔX − fee
//! ```
//!
//! # Invariants
//! - `K` is unchanged by a trade; the fee never enters the reserves
//! - Inputs are finite and strictly positive
//! - A quote that would move zero or negative value is rejected

use serde::{Deserialize, Serialize};

use lib_types::Amount;

use crate::errors::{MarketError, MarketResult};
use crate::fees::{FeeRouter, FeeSplit};

/// Virtual liquidity of one token
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reserves {
    pub sol: Amount,
    pub tokens: Amount,
}

impl Reserves {
    pub fn new(sol: Amount, tokens: Amount) -> Self {
        Self { sol, tokens }
    }

    /// `K = X · Y`
    pub fn invariant(&self) -> Amount {
        self.sol * self.tokens
    }

    /// SOL per token
    pub fn spot_price(&self) -> Amount {
        self.sol / self.tokens
    }
}

/// Priced buy, not yet committed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BuyQuote {
    /// Fee is taken from the SOL paid in
    pub sol: FeeSplit,
    pub tokens_out: Amount,
    pub before: Reserves,
    pub after: Reserves,
}

/// Priced sell, not yet committed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SellQuote {
    pub tokens_in: Amount,
    /// Fee is taken from the SOL the curve pays out
    pub sol: FeeSplit,
    pub before: Reserves,
    pub after: Reserves,
}

pub(crate) fn require_positive(amount: Amount, what: &str) -> MarketResult<()> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(MarketError::InvalidAmount(format!(
            "{} must be a positive number, got {}",
            what, amount
        )))
    }
}

/// Price a buy of `gross_sol`
pub fn quote_buy(reserves: Reserves, gross_sol: Amount, router: &FeeRouter) -> MarketResult<BuyQuote> {
    require_positive(gross_sol, "SOL amount")?;

    let sol = router.split(gross_sol);
    let k = reserves.invariant();
    let new_sol = reserves.sol + sol.net;
    let new_tokens = k / new_sol;
    let tokens_out = reserves.tokens - new_tokens;

    if !(tokens_out > 0.0) {
        return Err(MarketError::AmountTooSmall);
    }

    Ok(BuyQuote {
        sol,
        tokens_out,
        before: reserves,
        after: Reserves::new(new_sol, new_tokens),
    })
}

/// Price a sell of `tokens_in`
pub fn quote_sell(reserves: Reserves, tokens_in: Amount, router: &FeeRouter) -> MarketResult<SellQuote> {
    require_positive(tokens_in, "Token amount")?;

    let k = reserves.invariant();
    let new_tokens = reserves.tokens + tokens_in;
    let new_sol = k / new_tokens;
    let sol_out = reserves.sol - new_sol;

    if !(sol_out > 0.0) {
        return Err(MarketError::AmountTooSmall);
    }

    Ok(SellQuote {
        tokens_in,
        sol: router.split(sol_out),
        before: reserves,
        after: Reserves::new(new_sol, new_tokens),
    })
}
