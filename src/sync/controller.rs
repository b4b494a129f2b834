//! Control-channel task: sync maintenance and rate selection

use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::Instant;

use super::state::{ResumePolicy, SyncState, SyncStatus};
use crate::events::{EventBus, SessionEvent, ShutdownLevel};
use crate::ipc::messages::Notification;
use crate::protocol::status::{CLEAR_BUFFER_MSG, DacStatus, HEARTBEAT_MSG, INITIAL_SYNC_MSG};
use crate::transmit::PaceInterval;
use crate::types::{SessionConfig, SharedConfig};

/// We must send a heartbeat at least this often to keep the sync alive
const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(300);

/// The appliance heartbeats every 100 ms; this much silence means the sync
/// is gone
const SYNC_TIMEOUT: Duration = Duration::from_secs(1);

const RECEIVE_BUFFER_SIZE: usize = 256;

/// Jitter-buffer occupancy thresholds, in frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermarks {
    /// Below this, catch up at the fast interval
    pub low: u8,
    /// Steer toward this occupancy
    pub target: u8,
    /// Above this, bleed down at the slow interval
    pub high: u8,
}

impl Default for Watermarks {
    fn default() -> Self {
        Self {
            low: 15,
            target: 25,
            high: 35,
        }
    }
}

impl Watermarks {
    /// Pick the next pacing interval from the reported occupancy.
    ///
    /// Once the fast or slow interval is engaged it stays engaged until
    /// occupancy crosses back over the target, so the loop converges on the
    /// watermark instead of oscillating at the outer thresholds.
    #[must_use]
    pub fn select_interval(&self, current: PaceInterval, occupancy: u8) -> PaceInterval {
        match current {
            PaceInterval::Fast if occupancy < self.target => PaceInterval::Fast,
            PaceInterval::Slow if occupancy > self.target => PaceInterval::Slow,
            _ => {
                if occupancy < self.low {
                    PaceInterval::Fast
                } else if occupancy > self.high {
                    PaceInterval::Slow
                } else {
                    PaceInterval::Default
                }
            }
        }
    }
}

/// Owns the DAC control channel for one session
pub struct SyncController {
    socket: UdpSocket,
    group: String,
    shared: SharedConfig,
    bus: EventBus,
    status_tx: watch::Sender<SyncStatus>,
    interval_tx: watch::Sender<PaceInterval>,
    policy: ResumePolicy,
    watermarks: Watermarks,
}

impl SyncController {
    /// Bind the control socket and wire up the controller.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the socket cannot be bound or connected.
    pub async fn new(
        config: &SessionConfig,
        shared: SharedConfig,
        bus: EventBus,
        status_tx: watch::Sender<SyncStatus>,
        interval_tx: watch::Sender<PaceInterval>,
        policy: ResumePolicy,
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(config.control_addr()).await?;
        Ok(Self {
            socket,
            group: config.transmitter_group.clone(),
            shared,
            bus,
            status_tx,
            interval_tx,
            policy,
            watermarks: Watermarks::default(),
        })
    }

    /// Override the default watermarks
    #[must_use]
    pub fn with_watermarks(mut self, watermarks: Watermarks) -> Self {
        self.watermarks = watermarks;
        self
    }

    /// Clear the appliance buffer and request the initial sync.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the control messages cannot be sent.
    pub async fn perform_initial_sync(&self) -> std::io::Result<()> {
        self.socket.send(CLEAR_BUFFER_MSG).await?;
        self.socket.send(INITIAL_SYNC_MSG).await?;
        self.status_tx.send_modify(|s| s.state = SyncState::Syncing);
        tracing::info!("initial sync requested from DAC");
        Ok(())
    }

    fn mark_lost(&self) {
        if self.status_tx.borrow().state.is_synced() {
            tracing::error!("lost sync with the DAC, stalling transmission");
            self.status_tx
                .send_modify(|s| s.state = SyncState::Unsynced);
            self.bus.emit(SessionEvent::LostSync);
        }
    }

    fn mark_synced(&self, lost_at: Option<Instant>) {
        let status = *self.status_tx.borrow();
        if status.state.is_synced() {
            return;
        }
        let downtime = lost_at.map_or(Duration::ZERO, |t| t.elapsed());
        let directive = self.policy.directive(downtime);
        if status.ever_synced {
            tracing::info!(?downtime, ?directive, "regained sync with the DAC");
        } else {
            tracing::info!("initial sync with the DAC complete");
        }
        self.status_tx.send_modify(|s| {
            s.state = SyncState::Synced;
            s.directive = directive;
            s.ever_synced = true;
        });
        self.bus.emit(SessionEvent::RegainedSync { downtime });
    }

    /// Run the control loop until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an I/O error only for failures of the initial sync; runtime
    /// socket errors are treated as sync loss and retried.
    pub async fn run(
        self,
        mut shutdown: watch::Receiver<ShutdownLevel>,
    ) -> std::io::Result<()> {
        self.perform_initial_sync().await?;

        let mut buf = [0u8; RECEIVE_BUFFER_SIZE];
        let mut previous_status: Option<DacStatus> = None;
        let mut last_status_at: Option<Instant> = None;
        let mut lost_at: Option<Instant> = None;
        let mut last_heartbeat = Instant::now();

        loop {
            if *shutdown.borrow() != ShutdownLevel::Running {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => continue,
                received = tokio::time::timeout(HEARTBEAT_INTERVAL, self.socket.recv(&mut buf)) => {
                    match received {
                        Ok(Ok(len)) => {
                            let raw = String::from_utf8_lossy(&buf[..len]);
                            match DacStatus::parse(&raw) {
                                Ok(status) => {
                                    last_status_at = Some(Instant::now());
                                    self.mark_synced(lost_at.take());
                                    self.handle_status(status, &mut previous_status).await;
                                }
                                Err(e) => {
                                    // A malformed status is not a loss of sync.
                                    tracing::error!(error = %e, "invalid status message from DAC");
                                }
                            }
                        }
                        Ok(Err(e)) => {
                            tracing::error!(error = %e, "control channel receive failed");
                        }
                        Err(_) => {} // quiet interval; loss detected below
                    }
                }
            }

            let silent_too_long = last_status_at
                .map_or(true, |t| t.elapsed() >= SYNC_TIMEOUT);
            if silent_too_long && self.status_tx.borrow().state.is_synced() {
                lost_at = Some(Instant::now());
                previous_status = None;
                self.mark_lost();
            }

            if last_heartbeat.elapsed() >= HEARTBEAT_INTERVAL {
                if let Err(e) = self.socket.send(HEARTBEAT_MSG).await {
                    tracing::error!(error = %e, "could not send heartbeat to DAC");
                } else {
                    last_heartbeat = Instant::now();
                }
            }
        }

        tracing::info!("sync controller stopped");
        Ok(())
    }

    async fn handle_status(&self, status: DacStatus, previous: &mut Option<DacStatus>) {
        let current = *self.interval_tx.borrow();
        let next = self
            .watermarks
            .select_interval(current, status.buffer_occupancy);
        if next != current {
            tracing::debug!(
                occupancy = status.buffer_occupancy,
                from = ?current,
                to = ?next,
                "pacing interval changed"
            );
            let _ = self.interval_tx.send(next);
        }

        let transmitters = self.shared.snapshot().await.transmitters;
        if let Some(report) = status.delta_report(previous.as_ref(), &transmitters) {
            self.bus.notify(Notification::HardwareStatus {
                transmitter_group: self.group.clone(),
                status: report,
            });
        }
        *previous = Some(status);
    }
}
