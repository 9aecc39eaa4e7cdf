//! Background driver tasks for the scheduler
//!
//! Two long-lived tasks connect the scheduler to the outside world: a
//! listener forwarding connectivity transitions from the network monitor,
//! and a periodic wake-up that resumes eligible work while the app is not
//! foregrounded. Both are plain spawned tasks whose handles the embedder
//! owns; aborting the handle stops the driver.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::core::DownloadScheduler;
use crate::app::net::NetworkState;

/// Forward connectivity transitions to the scheduler
///
/// Runs until the network monitor is dropped.
pub fn spawn_network_listener(
    scheduler: Arc<DownloadScheduler>,
    mut rx: watch::Receiver<NetworkState>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let state = *rx.borrow_and_update();
            scheduler.handle_network_change(state).await;
        }
        debug!("Network monitor closed; listener exiting");
    })
}

/// Periodically wake the scheduler to resume eligible work
///
/// Each tick runs `process_background_downloads` to completion before the
/// next tick is considered, mirroring an OS background-fetch hook that is
/// told the work finished when the handler returns.
pub fn spawn_periodic_wake(
    scheduler: Arc<DownloadScheduler>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so the wake cadence
        // starts one full interval after startup
        ticker.tick().await;
        loop {
            ticker.tick().await;
            scheduler.process_background_downloads().await;
        }
    })
}
