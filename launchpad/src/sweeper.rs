//! Periodic Sweeper
//!
//! Background task that calls [`Launchpad::sweep`] on a fixed interval so
//! temple holds complete and stalled graduation airdrops finish without
//! waiting for the next trade.
//!
//! The sweep itself is synchronous store work and runs on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::launchpad::Launchpad;

/// Spawn the sweep loop on the current runtime
pub fn spawn_sweeper(launchpad: Arc<Launchpad>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = every.as_secs_f64(), "Sweeper started");

        loop {
            ticker.tick().await;

            let lp = launchpad.clone();
            match tokio::task::spawn_blocking(move || lp.sweep()).await {
                Ok(Ok(report)) => {
                    debug!(
                        timers = report.temple.len(),
                        graduations = report.graduations.len(),
                        "Sweep tick"
                    );
                }
                Ok(Err(e)) => error!(error = %e, kind = ?e.kind(), "Sweep failed"),
                Err(e) => error!(error = %e, "Sweep task panicked"),
            }
        }
    })
}

/// Start/stop handle around [`spawn_sweeper`]
#[derive(Debug)]
pub struct SweeperService {
    launchpad: Arc<Launchpad>,
    every: Duration,
    handle: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl SweeperService {
    pub fn new(launchpad: Arc<Launchpad>, every: Duration) -> Self {
        Self {
            launchpad,
            every,
            handle: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn start(&self) {
        let mut handle = self.handle.write().await;
        if handle.is_some() {
            warn!("Sweeper already running");
            return;
        }
        *handle = Some(spawn_sweeper(self.launchpad.clone(), self.every));
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.handle.write().await.take() {
            handle.abort();
            info!("Sweeper stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.handle.read().await.is_some()
    }
}
