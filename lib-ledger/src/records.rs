//! Ledger Records
//!
//! Persistent record types. Derived values (progress, market cap) are stored
//! alongside the reserves they are computed from so reads never recompute.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lib_types::{Amount, PhaseId, TokenId, TradeId, UserId};

// =============================================================================
// TOKEN
// =============================================================================

/// Launched token traded on its own virtual bonding curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub name: String,
    pub symbol: String,
    pub description: String,
    pub creator: UserId,
    /// Total token supply, used for airdrop sizing and holder percentages
    pub total_supply: Amount,
    /// Virtual SOL liquidity (X)
    pub virtual_sol_reserves: Amount,
    /// Virtual token liquidity (Y)
    pub virtual_token_reserves: Amount,
    /// Graduation progress, 0 to 100
    pub bonding_curve_progress: f64,
    /// Simulated market cap in USD
    pub market_cap: Amount,
    /// Monotonic false to true
    pub is_graduated: bool,
    pub graduated_at: Option<DateTime<Utc>>,
    /// Simulated liquidity migration reference
    pub migration_ref: Option<String>,
    /// Anti-rug cap on any single wallet's balance
    pub max_wallet_limit: Option<Amount>,
    /// SOL the creator spent on the launch buy
    pub creator_buy_amount: Amount,
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency version, bumped on every committed trade
    pub version: u64,
}

impl Token {
    /// Constant-product invariant K = X * Y
    pub fn invariant(&self) -> Amount {
        self.virtual_sol_reserves * self.virtual_token_reserves
    }

    /// Spot price in SOL per token
    pub fn spot_price(&self) -> Amount {
        if self.virtual_token_reserves <= 0.0 {
            return 0.0;
        }
        self.virtual_sol_reserves / self.virtual_token_reserves
    }

    /// Whether the bonding curve still accepts trades
    pub fn is_curve_active(&self) -> bool {
        !self.is_graduated
    }
}

// =============================================================================
// BALANCE & TRADE
// =============================================================================

/// Token holding of one user, one record per (user, token)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub user: UserId,
    pub token: TokenId,
    pub amount: Amount,
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "buy"),
            TradeSide::Sell => write!(f, "sell"),
        }
    }
}

/// Immutable trade record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub token: TokenId,
    pub user: UserId,
    pub side: TradeSide,
    /// Gross SOL paid on buys, net SOL received on sells
    pub sol_amount: Amount,
    pub token_amount: Amount,
    /// Protocol fee routed to the staking pool
    pub fee: Amount,
    pub price_at_trade: Amount,
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// STAKING
// =============================================================================

/// Per-token allocation reserved for stakers at launch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenReward {
    pub token: TokenId,
    pub symbol: String,
    pub amount: Amount,
    /// Set once the allocation has been airdropped on graduation
    pub distributed: bool,
}

/// The single protocol staking pool
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StakingPool {
    /// Sum of every `UserStake::staked_amount`
    pub total_staked: Amount,
    /// Accumulated trade fees, never decreases
    pub total_sol_rewards: Amount,
    pub token_rewards: Vec<TokenReward>,
}

impl StakingPool {
    pub fn token_reward(&self, token: &TokenId) -> Option<&TokenReward> {
        self.token_rewards.iter().find(|r| &r.token == token)
    }
}

/// Withdrawal waiting to be finalised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PendingWithdrawal {
    /// Part of the stored data model only. Instant withdrawals settle in a
    /// single commit, so staking never writes this and `complete_withdrawal`
    /// rejects it.
    Instant {
        amount: Amount,
        requested_at: DateTime<Utc>,
    },
    Standard {
        amount: Amount,
        requested_at: DateTime<Utc>,
        available_at: DateTime<Utc>,
    },
}

impl PendingWithdrawal {
    pub fn amount(&self) -> Amount {
        match self {
            PendingWithdrawal::Instant { amount, .. } => *amount,
            PendingWithdrawal::Standard { amount, .. } => *amount,
        }
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        match self {
            PendingWithdrawal::Instant { requested_at, .. } => *requested_at,
            PendingWithdrawal::Standard { requested_at, .. } => *requested_at,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PendingWithdrawal::Instant { .. } => "instant",
            PendingWithdrawal::Standard { .. } => "standard",
        }
    }
}

/// Token airdropped to a staker on graduation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenAirdrop {
    pub token: TokenId,
    pub symbol: String,
    pub amount: Amount,
    pub received_at: DateTime<Utc>,
    pub claimed: bool,
}

/// Stake position of one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStake {
    pub user: UserId,
    pub staked_amount: Amount,
    pub staked_at: Option<DateTime<Utc>>,
    /// Cumulative SOL rewards paid out, never decreases
    pub claimed_sol_rewards: Amount,
    pub pending_withdrawal: Option<PendingWithdrawal>,
    pub token_airdrops: Vec<TokenAirdrop>,
    pub version: u64,
}

impl UserStake {
    /// Empty position for a user that has never staked
    pub fn empty(user: UserId) -> Self {
        Self {
            user,
            staked_amount: 0.0,
            staked_at: None,
            claimed_sol_rewards: 0.0,
            pending_withdrawal: None,
            token_airdrops: Vec::new(),
            version: 0,
        }
    }

    /// Amount not reserved by a pending withdrawal
    pub fn unreserved_amount(&self) -> Amount {
        let reserved = self
            .pending_withdrawal
            .as_ref()
            .map(PendingWithdrawal::amount)
            .unwrap_or(0.0);
        (self.staked_amount - reserved).max(0.0)
    }
}

// =============================================================================
// GRADUATION
// =============================================================================

/// One staker's share of a graduation airdrop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirdropAllocation {
    pub user: UserId,
    pub amount: Amount,
    pub credited: bool,
}

/// Durable plan and progress of a token's graduation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraduationRecord {
    pub token: TokenId,
    pub symbol: String,
    pub graduated_at: DateTime<Utc>,
    pub migration_ref: String,
    pub airdrop_pool: Amount,
    pub total_staked_snapshot: Amount,
    pub allocations: Vec<AirdropAllocation>,
    pub completed: bool,
}

impl GraduationRecord {
    pub fn pending_allocations(&self) -> impl Iterator<Item = &AirdropAllocation> {
        self.allocations.iter().filter(|a| !a.credited)
    }
}

// =============================================================================
// TEMPLE
// =============================================================================

/// Tier configuration and live spot counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierReward {
    pub tier: u8,
    /// Market cap (USD) the token must hold
    pub mcap_threshold: Amount,
    pub max_spots: u32,
    /// Share of the phase BUFFDOGE pool, in percent
    pub buffdoge_percentage: f64,
    /// Share of the phase SOL pool, in percent
    pub sol_percentage: f64,
    pub spots_used: u32,
}

impl TierReward {
    pub fn spots_remaining(&self) -> u32 {
        self.max_spots.saturating_sub(self.spots_used)
    }

    pub fn is_full(&self) -> bool {
        self.spots_used >= self.max_spots
    }
}

/// A time-boxed achievement program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplePhase {
    pub id: PhaseId,
    pub phase_number: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    pub total_buffdoge_rewards: Amount,
    pub total_sol_rewards: Amount,
    pub tier_rewards: Vec<TierReward>,
}

impl TemplePhase {
    /// Active and `now` falls inside [start_date, end_date]
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.start_date <= now && now <= self.end_date
    }

    pub fn tier(&self, tier: u8) -> Option<&TierReward> {
        self.tier_rewards.iter().find(|t| t.tier == tier)
    }
}

/// Holder captured when a tier is achieved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderSnapshot {
    pub user: UserId,
    pub amount: Amount,
    /// Percent of the token's total supply
    pub percentage: f64,
}

/// Uniqueness key of an achievement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AchievementKey {
    pub phase: PhaseId,
    pub tier: u8,
    pub token: TokenId,
}

/// Progress of one token on one tier of one phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempleAchievement {
    pub token: TokenId,
    pub phase: PhaseId,
    pub tier: u8,
    pub mcap_threshold: Amount,
    pub timer_started_at: Option<DateTime<Utc>>,
    pub achieved_at: Option<DateTime<Utc>>,
    /// Set when the tier filled up while this timer was running
    pub abandoned_at: Option<DateTime<Utc>>,
    pub holder_snapshot: Vec<HolderSnapshot>,
    /// Provisional until achieved, then the awarded spot
    pub spot_number: u32,
    pub buffdoge_reward: Amount,
    pub sol_reward: Amount,
    pub version: u64,
}

/// Lifecycle state of an achievement record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AchievementState {
    TimerRunning,
    /// Timer stopped, may be restarted
    Reset,
    Achieved,
    Abandoned,
}

impl TempleAchievement {
    pub fn key(&self) -> AchievementKey {
        AchievementKey {
            phase: self.phase,
            tier: self.tier,
            token: self.token,
        }
    }

    pub fn state(&self) -> AchievementState {
        if self.achieved_at.is_some() {
            AchievementState::Achieved
        } else if self.abandoned_at.is_some() {
            AchievementState::Abandoned
        } else if self.timer_started_at.is_some() {
            AchievementState::TimerRunning
        } else {
            AchievementState::Reset
        }
    }
}
