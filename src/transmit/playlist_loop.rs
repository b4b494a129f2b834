//! Playlist-fed transmit loop: normal operation

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::audio::SILENCE_BYTE;
use crate::events::{EventBus, ShutdownLevel};
use crate::ipc::messages::Notification;
use crate::playlist::PlaylistScheduler;
use crate::protocol::frame::PAYLOAD_SIZE;
use crate::sync::{ResumeDirective, SyncHandle};

use super::handoff::{LoopOwner, TransmitHandoff};
use super::link::TransmitLink;
use super::pacing::PaceInterval;

/// How long to idle before asking the scheduler again when nothing is
/// playable
const EMPTY_PLAYLIST_RETRY: Duration = Duration::from_secs(1);

/// The playlist transmit loop: one frame per pacing tick from whatever
/// message the scheduler selects, until shutdown.
pub struct PlaylistLoop {
    link: TransmitLink,
    scheduler: PlaylistScheduler,
    handoff: Arc<TransmitHandoff>,
    sync: SyncHandle,
    bus: EventBus,
    group: String,
}

impl PlaylistLoop {
    /// Assemble the loop
    #[must_use]
    pub fn new(
        link: TransmitLink,
        scheduler: PlaylistScheduler,
        handoff: Arc<TransmitHandoff>,
        sync: SyncHandle,
        bus: EventBus,
        group: String,
    ) -> Self {
        Self {
            link,
            scheduler,
            handoff,
            sync,
            bus,
            group,
        }
    }

    /// Run until shutdown. Graceful shutdown stops before the next
    /// message; immediate shutdown interrupts the pacing wait.
    #[allow(clippy::too_many_lines)]
    pub async fn run(self, mut shutdown: watch::Receiver<ShutdownLevel>) {
        let Self {
            mut link,
            mut scheduler,
            handoff,
            mut sync,
            bus,
            group,
        } = self;

        let mut deadline = Instant::now();

        'outer: loop {
            if *shutdown.borrow() != ShutdownLevel::Running {
                break;
            }

            if handoff.yield_requested(LoopOwner::Playlist) {
                tracing::info!("pausing playlist playback for a broadcast takeover");
                let seed = handoff.lend(LoopOwner::Playlist, link.take_last()).await;
                link.seed(seed);
                deadline = Instant::now();
                tracing::info!("resuming playlist playback");
                continue;
            }

            let Some(mut playback) = scheduler.next(Utc::now()).await else {
                tokio::select! {
                    _ = tokio::time::sleep(EMPTY_PLAYLIST_RETRY) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            };

            if let Some(desc) = &playback.descriptor {
                tracing::debug!(
                    broadcast_id = desc.broadcast_id,
                    name = %desc.name,
                    "switching to message"
                );
                if playback.cursor.requires_confirmation() {
                    bus.notify(Notification::BroadcastConfirmed {
                        transmitter_group: group.clone(),
                        broadcast_id: desc.broadcast_id,
                    });
                }
                if playback.cursor.truncation_notice() {
                    bus.notify(Notification::ToneTruncated {
                        transmitter_group: group.clone(),
                        broadcast_id: desc.broadcast_id,
                        name: desc.name.clone(),
                    });
                }
            }

            let interrupt = playback.cursor.interrupt();
            while playback.cursor.has_remaining() && (interrupt || !scheduler.has_interrupt()) {
                if *shutdown.borrow() == ShutdownLevel::Immediate {
                    break 'outer;
                }

                if handoff.yield_requested(LoopOwner::Playlist) {
                    tracing::info!("pausing the playback of the current playlist");
                    let seed = handoff.lend(LoopOwner::Playlist, link.take_last()).await;
                    link.seed(seed);
                    deadline = Instant::now();
                    tracing::info!("resuming the playback of the current playlist");
                    continue;
                }

                // Stall, not skip: numbering must not advance while unsynced.
                if !sync.is_synced() {
                    let directive = tokio::select! {
                        directive = sync.wait_synced() => directive,
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() != ShutdownLevel::Running {
                                break 'outer;
                            }
                            continue;
                        }
                    };
                    if directive == ResumeDirective::RestartMessage && !playback.is_filler() {
                        tracing::info!("restarting transmission from the beginning of the current message");
                        playback.cursor.restart();
                    }
                    deadline = Instant::now();
                }

                let mut payload = [SILENCE_BYTE; PAYLOAD_SIZE];
                let (filled, status) = playback.cursor.fill_frame(&mut payload);
                if !filled {
                    break;
                }
                if let Some(status) = status {
                    bus.notify(Notification::PlaybackStatus(status));
                }

                tokio::select! {
                    () = tokio::time::sleep_until(deadline) => {}
                    () = wait_for_immediate(&mut shutdown) => break 'outer,
                }

                if let Err(e) = link.transmit(&payload).await {
                    tracing::error!(error = %e, "error sending frame to DAC, halting message broadcast");
                    break;
                }

                deadline += sync.current_interval().duration();
                // Never send earlier than the fast interval after the
                // previous frame; the rate controller handles real catch-up.
                let floor = Instant::now() + PaceInterval::Fast.duration();
                if deadline < floor {
                    deadline = floor;
                }
            }
        }

        tracing::info!("playlist transmit loop stopped");
    }
}

/// Resolve only when shutdown escalates to immediate
async fn wait_for_immediate(shutdown: &mut watch::Receiver<ShutdownLevel>) {
    loop {
        if *shutdown.borrow() == ShutdownLevel::Immediate {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
