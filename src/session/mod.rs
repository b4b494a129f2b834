//! Session lifecycle orchestration

mod maintenance;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::broadcast::LiveBroadcastControl;
use crate::error::DacTransmitError;
use crate::events::{EventBus, SessionEvent, ShutdownLevel};
use crate::ipc::messages::{LiveBroadcastState, Notification};
use crate::ipc::{CommsClient, CommsHandles, LiveCommand};
use crate::playlist::{InterruptLock, PlaylistScanner, PlaylistScheduler, initial_scan};
use crate::sync::{ResumePolicy, SyncController, SyncHandle};
use crate::transmit::broadcast_loop::{self, BroadcastOutcome, BroadcastProgress};
use crate::transmit::playlist_loop::PlaylistLoop;
use crate::transmit::{LoopOwner, TransmitHandoff, TransmitLink};
use crate::types::{SessionConfig, SharedConfig};

pub use maintenance::MaintenanceSession;

/// Handle for requesting shutdown from outside the session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    shutdown: Arc<watch::Sender<ShutdownLevel>>,
}

impl SessionHandle {
    /// Request shutdown. `now` interrupts the current pacing wait;
    /// otherwise the session stops at the next message boundary.
    pub fn shutdown(&self, now: bool) {
        let level = if now {
            ShutdownLevel::Immediate
        } else {
            ShutdownLevel::Graceful
        };
        self.shutdown.send_if_modified(|current| {
            if level > *current {
                *current = level;
                true
            } else {
                false
            }
        });
    }
}

/// A normal playlist-playback session against one DAC
#[derive(Debug)]
pub struct DacSession {
    config: SessionConfig,
    bus: EventBus,
    shared: SharedConfig,
    shutdown_tx: Arc<watch::Sender<ShutdownLevel>>,
    shutdown_rx: watch::Receiver<ShutdownLevel>,
}

impl DacSession {
    /// Validate the configuration and assemble a session.
    ///
    /// # Errors
    ///
    /// Returns a configuration error, which is fatal at session start.
    pub fn new(config: SessionConfig) -> Result<Self, DacTransmitError> {
        config.validate()?;
        let shared = SharedConfig::new(config.runtime());
        let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownLevel::Running);
        Ok(Self {
            config,
            bus: EventBus::new(),
            shared,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        })
    }

    /// Shutdown handle, safe to clone anywhere
    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shutdown: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Run the session to completion.
    ///
    /// Startup order matters: the control channel must establish sync
    /// before the first frame goes out, and the transmit loop must be
    /// running before the comms manager can hand us commands about it.
    ///
    /// # Errors
    ///
    /// Returns session-fatal errors only; broadcast-level failures are
    /// reported as notifications and retried.
    pub async fn run(self) -> Result<(), DacTransmitError> {
        let Self {
            config,
            bus,
            shared,
            shutdown_tx,
            shutdown_rx,
        } = self;
        let group = config.transmitter_group.clone();

        tracing::info!(
            dac = %config.dac_hostname,
            data_port = config.data_port,
            control_port = config.control_port,
            group = %group,
            "starting transmit session"
        );

        // Sync first: nothing is sent until the DAC answers.
        let (status_tx, interval_tx, sync) = SyncHandle::channel();
        let controller = SyncController::new(
            &config,
            shared.clone(),
            bus.clone(),
            status_tx,
            interval_tx,
            ResumePolicy::default(),
        )
        .await?;
        let sync_task = tokio::spawn({
            let bus = bus.clone();
            let group = group.clone();
            let shutdown_rx = shutdown_rx.clone();
            async move {
                if let Err(e) = controller.run(shutdown_rx).await {
                    tracing::error!(error = %e, "control channel failed, aborting the session");
                    bus.notify(Notification::CriticalError {
                        transmitter_group: group,
                        message: e.to_string(),
                    });
                    bus.emit(SessionEvent::ShutdownRequested { now: true });
                }
            }
        });

        // Nothing plays until the DAC answers the initial sync.
        {
            let mut sync_wait = sync.clone();
            let mut startup_events = bus.subscribe();
            let aborted = async {
                loop {
                    match startup_events.recv().await {
                        Ok(SessionEvent::ShutdownRequested { .. }) => break,
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            };
            tokio::select! {
                _ = sync_wait.wait_synced() => {
                    tracing::info!("initial sync complete, starting playback");
                }
                () = aborted => {
                    let _ = shutdown_tx.send(ShutdownLevel::Immediate);
                    let _ = sync_task.await;
                    return Err(DacTransmitError::InvalidState {
                        message: "session aborted before the initial sync completed".to_string(),
                    });
                }
            }
        }

        // Playlists: strict load at startup, tolerant rescans afterwards.
        let playlists = initial_scan(&config.playlist_directory).await?;
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (scanner, scan_control) =
            PlaylistScanner::new(config.playlist_directory.clone(), updates_tx);
        let interrupt_lock = InterruptLock::new();
        let mut scheduler = PlaylistScheduler::new(
            group.clone(),
            updates_rx,
            bus.clone(),
            interrupt_lock.clone(),
        );
        scheduler.load_playlists(playlists);

        let handoff = Arc::new(TransmitHandoff::new(LoopOwner::Playlist));
        let link = TransmitLink::new(config.data_addr(), shared.clone()).await?;
        let playlist_loop = PlaylistLoop::new(
            link,
            scheduler,
            Arc::clone(&handoff),
            sync.clone(),
            bus.clone(),
            group.clone(),
        );
        let transmit_task = tokio::spawn(playlist_loop.run(shutdown_rx.clone()));
        let scanner_task = tokio::spawn(scanner.run(shutdown_rx.clone()));

        // Supervisory channel last; it reports on everything above.
        let live = LiveBroadcastControl::new();
        let (live_cmd_tx, mut live_cmd_rx) = mpsc::unbounded_channel();
        // Held so the command channel outlives a crashed comms client and
        // the select below never spins on a closed receiver.
        let _live_cmd_keepalive = live_cmd_tx.clone();
        let comms = CommsClient::new(
            &config,
            CommsHandles {
                shared: shared.clone(),
                bus: bus.clone(),
                live: live.clone(),
                scan: scan_control,
            },
            live_cmd_tx,
        );
        let comms_task = tokio::spawn(comms.run(shutdown_rx.clone()));

        // Session event loop: shutdown escalation and live takeovers.
        let mut events = bus.subscribe();
        let mut shutdown_watch = shutdown_rx.clone();
        loop {
            tokio::select! {
                event = events.recv() => {
                    if let Ok(SessionEvent::ShutdownRequested { now }) = event {
                        let level = if now {
                            ShutdownLevel::Immediate
                        } else {
                            ShutdownLevel::Graceful
                        };
                        shutdown_tx.send_if_modified(|current| {
                            if level > *current {
                                *current = level;
                                true
                            } else {
                                false
                            }
                        });
                    }
                }
                command = live_cmd_rx.recv() => {
                    if let Some(LiveCommand::Start { broadcast_id, tones }) = command {
                        spawn_live_broadcast(LiveBroadcastContext {
                            broadcast_id,
                            tones,
                            config: &config,
                            shared: shared.clone(),
                            bus: bus.clone(),
                            sync: sync.clone(),
                            handoff: Arc::clone(&handoff),
                            live: live.clone(),
                            interrupt_lock: interrupt_lock.clone(),
                            group: group.clone(),
                        });
                    }
                }
                _ = shutdown_watch.changed() => {
                    if *shutdown_watch.borrow() != ShutdownLevel::Running {
                        break;
                    }
                }
            }
        }

        tracing::info!("session shutting down");
        let _ = transmit_task.await;
        let _ = scanner_task.await;
        let _ = comms_task.await;
        let _ = sync_task.await;
        tracing::info!("session shutdown complete");
        Ok(())
    }
}

struct LiveBroadcastContext<'a> {
    broadcast_id: String,
    tones: Vec<u8>,
    config: &'a SessionConfig,
    shared: SharedConfig,
    bus: EventBus,
    sync: SyncHandle,
    handoff: Arc<TransmitHandoff>,
    live: LiveBroadcastControl,
    interrupt_lock: InterruptLock,
    group: String,
}

/// Orchestrate a live takeover: pause the playlist loop via the handoff
/// token, stream the bounded queue, and give the token (and the last
/// frame) back.
fn spawn_live_broadcast(ctx: LiveBroadcastContext<'_>) {
    let LiveBroadcastContext {
        broadcast_id,
        tones,
        config,
        shared,
        bus,
        sync,
        handoff,
        live,
        interrupt_lock,
        group,
    } = ctx;

    let progress = Arc::new(BroadcastProgress::new());
    let Some((audio_rx, halt_rx)) = live.begin(&broadcast_id, Arc::clone(&progress)) else {
        tracing::error!(%broadcast_id, "another live broadcast is already active");
        bus.notify(Notification::LiveBroadcastStatus {
            transmitter_group: group,
            broadcast_id,
            success: false,
            message: Some("another live broadcast is already active".to_string()),
        });
        return;
    };

    // Queue the tones before taking over so the loop has a full window.
    if !tones.is_empty() {
        live.push_audio(&broadcast_id, &tones);
    }
    interrupt_lock.engage();

    let data_addr = config.data_addr();
    tokio::spawn(async move {
        let seed = handoff.acquire(LoopOwner::Broadcast).await;
        bus.notify(Notification::LiveBroadcastSwitch {
            transmitter_group: group.clone(),
            broadcast_id: broadcast_id.clone(),
            state: LiveBroadcastState::Started,
        });

        let outcome = match TransmitLink::new(data_addr, shared).await {
            Ok(mut link) => {
                link.seed(seed);
                bus.notify(Notification::LiveBroadcastStatus {
                    transmitter_group: group.clone(),
                    broadcast_id: broadcast_id.clone(),
                    success: true,
                    message: None,
                });
                let (link, outcome) =
                    broadcast_loop::run(link, sync, audio_rx, progress, halt_rx).await;
                handoff.release(LoopOwner::Broadcast, link.take_last());
                outcome
            }
            Err(e) => {
                tracing::error!(error = %e, "could not open a data socket for the live broadcast");
                handoff.release(LoopOwner::Broadcast, None);
                BroadcastOutcome::Error
            }
        };

        bus.notify(Notification::LiveBroadcastSwitch {
            transmitter_group: group.clone(),
            broadcast_id: broadcast_id.clone(),
            state: LiveBroadcastState::Finished,
        });
        if outcome == BroadcastOutcome::Error {
            bus.notify(Notification::LiveBroadcastStatus {
                transmitter_group: group.clone(),
                broadcast_id: broadcast_id.clone(),
                success: false,
                message: Some("audio streaming failed".to_string()),
            });
        }

        live.clear(&broadcast_id);
        interrupt_lock.release();
        tracing::info!(%broadcast_id, ?outcome, "live broadcast finished");
    });
}
