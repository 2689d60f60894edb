//! Bonding Curve Market
//!
//! Token launch, constant-product trading, protocol fee routing and the
//! one-time graduation of a token off its curve.
//!
//! # State Machine
//! ```text
//!   ┌─────────┐   progress reaches 100   ┌───────────┐
//!   │  Curve  │ ───────────────────────▶ │ Graduated │  (trading closed)
//!   └─────────┘      (irreversible)      └───────────┘
//! ```

pub mod config;
pub mod curve;
pub mod errors;
pub mod fees;
pub mod graduation;
pub mod market;

pub use config::MarketConfig;
pub use curve::{quote_buy, quote_sell, BuyQuote, Reserves, SellQuote};
pub use errors::{GraduationError, GraduationResult, MarketError, MarketResult};
pub use fees::{FeeRouter, FeeSplit};
pub use graduation::GraduationCoordinator;
pub use market::{
    BondingCurveMarket, LaunchReceipt, LaunchRequest, TradeReceipt, DEFAULT_HISTORY_LIMIT,
    MAX_SYMBOL_LEN,
};
