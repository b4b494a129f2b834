//! Sync state shared with the transmit loops

use std::time::Duration;

use tokio::sync::watch;

use crate::transmit::PaceInterval;

/// Sync downtime at or beyond this triggers the restart directive
pub const RESTART_THRESHOLD: Duration = Duration::from_secs(2);

/// Where the session stands with the appliance's control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No sync; transmission must stall
    Unsynced,
    /// Initial sync sent, waiting for the first status reply
    Syncing,
    /// Heartbeats flowing; transmission may proceed
    Synced,
}

impl SyncState {
    /// Whether frames may be emitted
    #[must_use]
    pub fn is_synced(self) -> bool {
        matches!(self, SyncState::Synced)
    }
}

/// What a transmit loop should do with its stalled position once sync
/// returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResumeDirective {
    /// Send the held frame and keep going
    #[default]
    Continue,
    /// Restart the current message rather than deliver stale audio
    RestartMessage,
}

/// Policy for long desyncs. Short desyncs always resume in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResumePolicy {
    /// Restart the current message once downtime reaches the threshold
    #[default]
    RestartAfterThreshold,
    /// Always resume in place regardless of downtime
    AlwaysResume,
}

impl ResumePolicy {
    /// Directive for a desync of the given duration
    #[must_use]
    pub fn directive(self, downtime: Duration) -> ResumeDirective {
        match self {
            ResumePolicy::RestartAfterThreshold if downtime >= RESTART_THRESHOLD => {
                ResumeDirective::RestartMessage
            }
            _ => ResumeDirective::Continue,
        }
    }
}

/// Snapshot published to the transmit loops on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStatus {
    /// Current state
    pub state: SyncState,
    /// What to do with the stalled position on resume
    pub directive: ResumeDirective,
    /// Whether the initial sync has ever completed this session
    pub ever_synced: bool,
}

impl SyncStatus {
    /// Initial, pre-sync status
    #[must_use]
    pub fn initial() -> Self {
        Self {
            state: SyncState::Unsynced,
            directive: ResumeDirective::Continue,
            ever_synced: false,
        }
    }
}

/// Read-side handle to the sync controller, safe to clone into any task
#[derive(Debug, Clone)]
pub struct SyncHandle {
    status_rx: watch::Receiver<SyncStatus>,
    interval_rx: watch::Receiver<PaceInterval>,
}

impl SyncHandle {
    /// Pair a handle with its write side
    #[must_use]
    pub fn channel() -> (
        watch::Sender<SyncStatus>,
        watch::Sender<PaceInterval>,
        SyncHandle,
    ) {
        let (status_tx, status_rx) = watch::channel(SyncStatus::initial());
        let (interval_tx, interval_rx) = watch::channel(PaceInterval::Default);
        (
            status_tx,
            interval_tx,
            SyncHandle {
                status_rx,
                interval_rx,
            },
        )
    }

    /// Current status snapshot
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        *self.status_rx.borrow()
    }

    /// Whether frames may be emitted right now
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.status_rx.borrow().state.is_synced()
    }

    /// Whether the initial sync has ever completed
    #[must_use]
    pub fn ever_synced(&self) -> bool {
        self.status_rx.borrow().ever_synced
    }

    /// The pacing interval the rate controller currently wants
    #[must_use]
    pub fn current_interval(&self) -> PaceInterval {
        *self.interval_rx.borrow()
    }

    /// Wait until the controller reports sync, returning the resume
    /// directive that applies to the stalled position.
    ///
    /// Returns `ResumeDirective::Continue` if the controller went away
    /// (session teardown).
    pub async fn wait_synced(&mut self) -> ResumeDirective {
        loop {
            let status = *self.status_rx.borrow_and_update();
            if status.state.is_synced() {
                return status.directive;
            }
            if self.status_rx.changed().await.is_err() {
                return ResumeDirective::Continue;
            }
        }
    }
}
