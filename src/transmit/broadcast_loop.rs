//! Queue-fed transmit loop: live and maintenance broadcast

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::protocol::frame::PAYLOAD_SIZE;
use crate::sync::{ResumeDirective, SyncHandle};

use super::link::TransmitLink;
use super::pacing::PaceInterval;

/// With only a 20 ms window per frame, check for fresh data every 5 ms;
/// a drained queue with nothing arriving in that window ends the broadcast
const DRAIN_POLL: Duration = Duration::from_millis(5);

/// One queued frame payload
pub type FramePayload = [u8; PAYLOAD_SIZE];

/// Shared progress counters for a queue-fed broadcast, read by the
/// maintenance reaper
#[derive(Debug, Default)]
pub struct BroadcastProgress {
    queued: AtomicUsize,
    consumed: AtomicUsize,
}

impl BroadcastProgress {
    /// New counters at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one frame entering the queue
    pub fn frame_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one frame transmitted
    pub fn frame_consumed(&self) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames transmitted so far
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.consumed.load(Ordering::Relaxed)
    }

    /// Frames queued but not yet transmitted
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.queued
            .load(Ordering::Relaxed)
            .saturating_sub(self.consumed())
    }
}

/// Outcome of a queue-fed broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// The queue drained and the broadcast ended naturally
    Finished,
    /// The broadcast was halted from outside
    Halted,
    /// A transmission failure stopped the broadcast
    Error,
}

/// Stream queued frames until the queue drains, a halt arrives, or
/// transmission fails. Returns the link (carrying the final frame for the
/// handoff back) and the outcome.
pub async fn run(
    mut link: TransmitLink,
    mut sync: SyncHandle,
    mut frames: mpsc::Receiver<FramePayload>,
    progress: Arc<BroadcastProgress>,
    mut halt: watch::Receiver<bool>,
) -> (TransmitLink, BroadcastOutcome) {
    let mut outcome = BroadcastOutcome::Finished;
    let mut deadline = Instant::now();

    loop {
        if *halt.borrow() {
            tracing::info!("broadcast halted");
            outcome = BroadcastOutcome::Halted;
            break;
        }

        let payload = tokio::select! {
            received = frames.recv() => match received {
                Some(payload) => payload,
                None => break, // producer finished and the queue drained
            },
            () = tokio::time::sleep(DRAIN_POLL) => break,
            changed = halt.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        };

        if !sync.is_synced() {
            let directive = tokio::select! {
                directive = sync.wait_synced() => directive,
                changed = halt.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };
            if directive == ResumeDirective::RestartMessage {
                // A queue-fed source cannot be rewound.
                tracing::warn!("regained sync with the DAC, unable to restart the audio stream");
            }
            deadline = Instant::now();
        }

        tokio::select! {
            () = tokio::time::sleep_until(deadline) => {}
            () = halted(&mut halt) => continue,
        }

        if let Err(e) = link.transmit(&payload).await {
            tracing::error!(error = %e, "audio streaming failed, terminating the transmission");
            outcome = BroadcastOutcome::Error;
            break;
        }
        progress.frame_consumed();

        deadline += sync.current_interval().duration();
        let floor = Instant::now() + PaceInterval::Fast.duration();
        if deadline < floor {
            deadline = floor;
        }
    }

    // One more interval so the final frames have time to land.
    tokio::time::sleep(PaceInterval::Default.duration()).await;
    (link, outcome)
}

/// Resolve only once a halt is requested
async fn halted(halt: &mut watch::Receiver<bool>) {
    loop {
        if *halt.borrow() {
            return;
        }
        if halt.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
