//! The launchpad on a sled ledger survives a restart

use std::sync::Arc;

use anyhow::Result;

use launchpad::ledger::{LedgerStore, SledLedger, TradeSide};
use launchpad::market::{LaunchRequest, MarketConfig};
use launchpad::types::{Caller, SystemClock, UserId};
use launchpad::{Launchpad, LaunchpadConfig, StorageConfig};

fn open(path: &std::path::Path, config: &LaunchpadConfig) -> Result<(Arc<SledLedger>, Launchpad)> {
    let store = Arc::new(SledLedger::open(path)?);
    let launchpad = Launchpad::new(store.clone(), Arc::new(SystemClock), config)?;
    Ok((store, launchpad))
}

#[test]
fn test_state_survives_reopen() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = LaunchpadConfig::default();
    let trader = Caller::user(UserId::new());
    let staker = Caller::user(UserId::new());

    let (token, bought) = {
        let (store, launchpad) = open(dir.path(), &config)?;
        launchpad.stake(&staker, 2_000_000.0)?;
        let token = launchpad
            .launch_token(
                &Caller::user(UserId::new()),
                LaunchRequest {
                    name: "Durable".into(),
                    symbol: "DUR".into(),
                    ..LaunchRequest::default()
                },
            )?
            .token
            .id;
        let bought = launchpad.buy(&trader, &token, 1.5)?.tokens();
        launchpad.sell(&trader, &token, bought / 3.0)?;
        store.flush()?;
        (token, bought)
    };

    let (_store, launchpad) = open(dir.path(), &config)?;
    let reloaded = launchpad.get_token(&token)?;
    assert_eq!(reloaded.version, 2);
    assert!((launchpad.balance(&trader, &token)? - bought * 2.0 / 3.0).abs() < 1e-3);

    let history = launchpad.trade_history(&token, None)?;
    assert_eq!(history.len(), 2);
    // newest first
    assert_eq!(history[0].side, TradeSide::Sell);
    assert_eq!(history[1].side, TradeSide::Buy);

    let stats = launchpad.pool_stats()?;
    assert_eq!(stats.total_staked, 2_000_000.0);
    assert!(stats.total_sol_rewards > 0.0);
    assert_eq!(launchpad.stake_position(&staker)?.staked_amount, 2_000_000.0);
    Ok(())
}

#[test]
fn test_graduation_on_sled() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = LaunchpadConfig {
        market: MarketConfig::for_testing(),
        storage: StorageConfig::Sled {
            path: dir.path().join("ledger"),
        },
        ..LaunchpadConfig::default()
    };
    let store = config.storage.open()?;
    let launchpad = Launchpad::new(store.clone(), Arc::new(SystemClock), &config)?;

    let staker = Caller::user(UserId::new());
    launchpad.stake(&staker, 1_000_000.0)?;
    let token = launchpad
        .launch_token(
            &Caller::user(UserId::new()),
            LaunchRequest {
                name: "Sled Grad".into(),
                symbol: "SGRAD".into(),
                initial_buy: Some(6.0),
                ..LaunchRequest::default()
            },
        )?
        .token;

    assert!(token.is_graduated);
    let record = store.get_graduation(&token.id)?.expect("graduation record");
    assert!(record.completed);
    assert_eq!(record.allocations.len(), 1);
    assert!((launchpad.balance(&staker, &token.id)? - 50_000_000.0).abs() < 1e-6);
    Ok(())
}
