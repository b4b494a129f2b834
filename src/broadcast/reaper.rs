//! Maintenance broadcast watchdog
//!
//! A maintenance session must not hang on a dead appliance. The reaper
//! gives the broadcast one grace window to complete the initial sync and
//! then requires forward progress between consecutive checks, killing the
//! session otherwise.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::sync::SyncHandle;
use crate::transmit::broadcast_loop::BroadcastProgress;

/// Grace window between progress checks
pub const REAPER_GRACE: Duration = Duration::from_secs(5);

/// Watch a maintenance broadcast and halt it if it stops making progress.
///
/// Returns `true` if the broadcast was reaped, `false` if it completed (or
/// will complete) naturally.
pub async fn reap(
    progress: Arc<BroadcastProgress>,
    sync: SyncHandle,
    halt: watch::Sender<bool>,
    grace: Duration,
) -> bool {
    tokio::time::sleep(grace).await;

    if !sync.ever_synced() {
        tracing::info!("maintenance session never completed the initial sync with the DAC");
        kill(&progress, &halt);
        return true;
    }

    let mut last_consumed = progress.consumed();
    loop {
        tokio::time::sleep(grace).await;

        if progress.remaining() == 0 {
            // Everything queued has been broadcast; the session will stop
            // naturally.
            return false;
        }

        let consumed = progress.consumed();
        if consumed == last_consumed {
            kill(&progress, &halt);
            return true;
        }
        last_consumed = consumed;
    }
}

fn kill(progress: &BroadcastProgress, halt: &watch::Sender<bool>) {
    tracing::info!(
        remaining = progress.remaining(),
        "reaping the maintenance broadcast"
    );
    let _ = halt.send(true);
}
