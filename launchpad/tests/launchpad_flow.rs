//! End-to-end flows through the launchpad facade on the in-memory ledger

use std::sync::Arc;

use anyhow::Result;
use chrono::Duration;

use launchpad::ledger::{AchievementState, LedgerStore, MemoryLedger, PendingWithdrawal};
use launchpad::market::{LaunchRequest, MarketConfig, MarketError};
use launchpad::staking::StakingError;
use launchpad::temple::{PhaseRequest, TierRequest};
use launchpad::types::{Caller, Clock, ManualClock, TokenId, UserId};
use launchpad::{ErrorKind, Launchpad, LaunchpadConfig, LaunchpadError};

struct Env {
    store: Arc<MemoryLedger>,
    clock: Arc<ManualClock>,
    launchpad: Arc<Launchpad>,
}

fn env_with(config: LaunchpadConfig) -> Env {
    let store = Arc::new(MemoryLedger::new());
    let clock = Arc::new(ManualClock::default());
    let launchpad = Arc::new(Launchpad::new(store.clone(), clock.clone(), &config).unwrap());
    Env {
        store,
        clock,
        launchpad,
    }
}

fn env() -> Env {
    env_with(LaunchpadConfig::default())
}

fn user() -> Caller {
    Caller::user(UserId::new())
}

fn user_id(caller: &Caller) -> UserId {
    caller.require().unwrap().user_id()
}

fn launch(env: &Env, creator: &Caller, symbol: &str) -> TokenId {
    env.launchpad
        .launch_token(
            creator,
            LaunchRequest {
                name: format!("{} token", symbol),
                symbol: symbol.into(),
                ..LaunchRequest::default()
            },
        )
        .unwrap()
        .token
        .id
}

fn phase(env: &Env, tiers: Vec<TierRequest>) {
    let now = env.clock.now();
    env.launchpad
        .create_phase(
            &user(),
            PhaseRequest {
                phase_number: 1,
                start_date: now - Duration::hours(1),
                end_date: now + Duration::days(7),
                is_active: true,
                total_buffdoge_rewards: 1_000_000.0,
                total_sol_rewards: 100.0,
                tiers,
            },
        )
        .unwrap();
}

fn tier(tier: u8, mcap_threshold: f64, max_spots: u32) -> TierRequest {
    TierRequest {
        tier,
        mcap_threshold,
        max_spots,
        buffdoge_percentage: 20.0,
        sol_percentage: 20.0,
    }
}

// =============================================================================
// Market
// =============================================================================

#[test]
fn test_reference_buy() -> Result<()> {
    let env = env();
    let token = launch(&env, &user(), "REF");
    let buyer = user();

    let receipt = env.launchpad.buy(&buyer, &token, 1.0)?;
    let expected = 1_000_000_000.0 - (30.0 * 1_000_000_000.0) / 30.998;
    assert!((receipt.tokens() - expected).abs() < 1e-3);
    assert!((receipt.token.virtual_sol_reserves - 30.998).abs() < 1e-12);
    assert!((receipt.new_market_cap() - 30.998 * 200.0).abs() < 1e-9);

    assert!((env.launchpad.pool_stats()?.total_sol_rewards - 0.002).abs() < 1e-15);
    assert!((env.launchpad.balance(&buyer, &token)? - expected).abs() < 1e-3);
    assert_eq!(env.launchpad.trade_history(&token, None)?.len(), 1);
    Ok(())
}

#[test]
fn test_anonymous_caller_rejected_without_writes() -> Result<()> {
    let env = env();
    let token = launch(&env, &user(), "ANON");

    let err = env.launchpad.buy(&Caller::Anonymous, &token, 1.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    let err = env.launchpad.stake(&Caller::Anonymous, 5_000_000.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    assert!(env.launchpad.trade_history(&token, None)?.is_empty());
    assert_eq!(env.launchpad.pool_stats()?.total_staked, 0.0);
    Ok(())
}

#[test]
fn test_buy_then_sell_loses_value() -> Result<()> {
    let env = env();
    let token = launch(&env, &user(), "RT");
    let trader = user();

    let bought = env.launchpad.buy(&trader, &token, 2.0)?;
    let sold = env.launchpad.sell(&trader, &token, bought.tokens())?;
    assert!(sold.sol() < 2.0);
    assert!(env.launchpad.balance(&trader, &token)?.abs() < 1e-6);

    let err = env.launchpad.sell(&trader, &token, 1.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);
    Ok(())
}

#[test]
fn test_launch_with_initial_buy_respects_wallet_limit() {
    let env = env();
    let creator = user();

    let err = env
        .launchpad
        .launch_token(
            &creator,
            LaunchRequest {
                name: "Capped".into(),
                symbol: "CAP".into(),
                max_wallet_limit: Some(1_000_000.0),
                initial_buy: Some(1.0),
                ..LaunchRequest::default()
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        LaunchpadError::Market(MarketError::WalletLimitExceeded { .. })
    ));
    assert!(env.launchpad.list_tokens().unwrap().is_empty());

    let receipt = env
        .launchpad
        .launch_token(
            &creator,
            LaunchRequest {
                name: "Capped".into(),
                symbol: "CAP".into(),
                max_wallet_limit: Some(50_000_000.0),
                initial_buy: Some(1.0),
                ..LaunchRequest::default()
            },
        )
        .unwrap();
    assert_eq!(receipt.token.creator_buy_amount, 1.0);
    assert!(receipt.initial_buy.is_some());
    assert_eq!(env.launchpad.pool_stats().unwrap().tokens_created, 1);
}

// =============================================================================
// Staking
// =============================================================================

#[test]
fn test_fee_rewards_flow_to_stakers() -> Result<()> {
    let env = env();
    let alice = user();
    let bob = user();
    env.launchpad.stake(&alice, 1_000_000.0)?;
    env.launchpad.stake(&bob, 9_000_000.0)?;

    let token = launch(&env, &user(), "FEE");
    env.launchpad.buy(&user(), &token, 10.0)?;

    let rewards = env.launchpad.user_rewards(&alice)?;
    assert!((rewards.share_percentage - 10.0).abs() < 1e-9);
    assert!((rewards.unclaimed - 0.002).abs() < 1e-12);
    assert!((rewards.token_rewards[0].amount - 5_000_000.0).abs() < 1e-3);

    let paid = env.launchpad.claim_rewards(&alice)?;
    assert!((paid - 0.002).abs() < 1e-12);
    let err = env.launchpad.claim_rewards(&alice).unwrap_err();
    assert_eq!(err, LaunchpadError::Staking(StakingError::NoRewardsAvailable));
    assert_eq!(err.kind(), ErrorKind::StateConflict);
    Ok(())
}

#[test]
fn test_standard_withdrawal_lifecycle() -> Result<()> {
    let env = env();
    let staker = user();
    env.launchpad.stake(&staker, 4_000_000.0)?;

    let pending = env.launchpad.withdraw_standard(&staker, 1_000_000.0)?;
    let available_at = match pending {
        PendingWithdrawal::Standard { available_at, .. } => available_at,
        other => panic!("unexpected withdrawal {:?}", other),
    };
    assert_eq!(available_at, env.clock.now() + Duration::days(5));

    let err = env.launchpad.withdraw_standard(&staker, 1.0).unwrap_err();
    assert_eq!(err, LaunchpadError::Staking(StakingError::WithdrawalAlreadyPending));

    // reserved part cannot be taken instantly
    let err = env.launchpad.withdraw_instant(&staker, 3_500_000.0).unwrap_err();
    assert!(matches!(
        err,
        LaunchpadError::Staking(StakingError::InsufficientStake { .. })
    ));

    env.clock.advance(Duration::days(5) - Duration::seconds(1));
    let err = env.launchpad.complete_withdrawal(&staker).unwrap_err();
    assert!(matches!(
        err,
        LaunchpadError::Staking(StakingError::NotYetAvailable { .. })
    ));

    env.clock.advance(Duration::seconds(1));
    assert_eq!(env.launchpad.complete_withdrawal(&staker)?, 1_000_000.0);
    assert_eq!(
        env.launchpad.complete_withdrawal(&staker).unwrap_err(),
        LaunchpadError::Staking(StakingError::NoPendingWithdrawal)
    );

    let position = env.launchpad.stake_position(&staker)?;
    assert_eq!(position.staked_amount, 3_000_000.0);
    assert_eq!(env.launchpad.pool_stats()?.total_staked, 3_000_000.0);

    let instant = env.launchpad.withdraw_instant(&staker, 1_000_000.0)?;
    assert_eq!(instant.fee, 50_000.0);
    assert_eq!(instant.net_amount, 950_000.0);
    Ok(())
}

#[test]
fn test_concurrent_stakes_keep_pool_total() {
    let env = env();
    let stakers: Vec<Caller> = (0..8).map(|_| user()).collect();

    let handles: Vec<_> = stakers
        .iter()
        .copied()
        .map(|staker| {
            let launchpad = env.launchpad.clone();
            std::thread::spawn(move || {
                for _ in 0..10 {
                    launchpad.stake(&staker, 1_000_000.0).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let sum: f64 = env
        .store
        .list_user_stakes()
        .unwrap()
        .iter()
        .map(|s| s.staked_amount)
        .sum();
    assert_eq!(sum, 80_000_000.0);
    assert_eq!(env.launchpad.pool_stats().unwrap().total_staked, 80_000_000.0);
}

// =============================================================================
// Graduation
// =============================================================================

#[test]
fn test_graduation_airdrops_stakers_and_closes_market() -> Result<()> {
    let config = LaunchpadConfig {
        market: MarketConfig::for_testing(),
        ..LaunchpadConfig::default()
    };
    let env = env_with(config);
    let small = user();
    let large = user();
    env.launchpad.stake(&small, 1_000_000.0)?;
    env.launchpad.stake(&large, 3_000_000.0)?;

    let token = launch(&env, &user(), "GRAD");
    let receipt = env.launchpad.buy(&user(), &token, 6.0)?;
    assert!(receipt.graduated);
    assert_eq!(receipt.new_progress(), 100.0);

    let record = env.store.get_graduation(&token)?.expect("graduation record");
    assert!(record.completed);
    assert!(record.allocations.iter().all(|a| a.credited));
    assert!((env.launchpad.balance(&small, &token)? - 12_500_000.0).abs() < 1e-6);
    assert!((env.launchpad.balance(&large, &token)? - 37_500_000.0).abs() < 1e-6);

    let airdrops = env.launchpad.user_rewards(&small)?.airdrops;
    assert_eq!(airdrops.len(), 1);
    assert_eq!(airdrops[0].token, token);

    let stats = env.launchpad.pool_stats()?;
    assert_eq!(stats.tokens_graduated, 1);
    assert!(stats.token_rewards[0].distributed);

    let err = env.launchpad.buy(&user(), &token, 1.0).unwrap_err();
    assert!(matches!(err, LaunchpadError::Market(MarketError::MarketClosed(_))));
    assert_eq!(err.kind(), ErrorKind::StateConflict);

    // resume is a no-op once complete
    let report = env.launchpad.sweep()?;
    assert!(report.graduations.is_empty());
    assert!((env.launchpad.balance(&small, &token)? - 12_500_000.0).abs() < 1e-6);
    Ok(())
}

// =============================================================================
// Temple
// =============================================================================

#[test]
fn test_trade_starts_timer_and_sweep_awards() -> Result<()> {
    let env = env();
    phase(&env, vec![tier(1, 6_500.0, 2)]);
    let token = launch(&env, &user(), "MOON");
    let holder = user();

    // 30 + 2.994 SOL => market cap 6,598.8
    env.launchpad.buy(&holder, &token, 3.0)?;
    let running = env.launchpad.achievements(None)?;
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].state(), AchievementState::TimerRunning);

    env.clock.advance(Duration::minutes(30));
    let report = env.launchpad.sweep()?;
    assert_eq!(report.awarded(), 1);

    let won = &env.launchpad.achievements(None)?[0];
    assert_eq!(won.state(), AchievementState::Achieved);
    assert_eq!(won.spot_number, 1);
    assert_eq!(won.sol_reward, 20.0);
    assert_eq!(won.holder_snapshot.len(), 1);
    assert_eq!(won.holder_snapshot[0].user, user_id(&holder));

    let status = env.launchpad.current_phase()?.expect("current phase");
    assert_eq!(status.tiers[0].spots_filled, 1);
    assert_eq!(status.tiers[0].spots_remaining, 1);
    Ok(())
}

#[test]
fn test_sell_below_threshold_resets_timer() -> Result<()> {
    let env = env();
    phase(&env, vec![tier(1, 6_500.0, 2)]);
    let token = launch(&env, &user(), "DIP");
    let trader = user();

    let bought = env.launchpad.buy(&trader, &token, 3.0)?;
    env.clock.advance(Duration::minutes(20));
    env.launchpad.sell(&trader, &token, bought.tokens() / 2.0)?;

    let record = &env.launchpad.achievements(None)?[0];
    assert_eq!(record.state(), AchievementState::Reset);

    // a reset timer is not swept
    env.clock.advance(Duration::minutes(30));
    assert!(env.launchpad.sweep()?.temple.is_empty());
    Ok(())
}

#[test]
fn test_last_spot_race_through_sweep() -> Result<()> {
    let env = env();
    phase(&env, vec![tier(1, 6_500.0, 1)]);
    let first = launch(&env, &user(), "ONE");
    let second = launch(&env, &user(), "TWO");
    env.launchpad.buy(&user(), &first, 3.0)?;
    env.launchpad.buy(&user(), &second, 3.0)?;
    env.clock.advance(Duration::minutes(31));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let launchpad = env.launchpad.clone();
            std::thread::spawn(move || launchpad.sweep().unwrap())
        })
        .collect();
    let awarded: usize = handles
        .into_iter()
        .map(|handle| handle.join().unwrap().awarded())
        .sum();
    assert_eq!(awarded, 1);

    let states: Vec<AchievementState> = env
        .launchpad
        .achievements(None)?
        .iter()
        .map(|a| a.state())
        .collect();
    assert_eq!(states.iter().filter(|s| **s == AchievementState::Achieved).count(), 1);
    assert_eq!(states.iter().filter(|s| **s == AchievementState::Abandoned).count(), 1);
    Ok(())
}
