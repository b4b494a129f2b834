//! Maintenance (alignment test) sessions
//!
//! A maintenance session streams one pre-baked tone or speech file to the
//! DAC and self-terminates. A reaper watches for zero progress so a dead
//! appliance can never leave the session hanging.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::audio::load_audio;
use crate::broadcast::{REAPER_GRACE, chunk_frames, reap};
use crate::error::DacTransmitError;
use crate::events::{EventBus, ShutdownLevel};
use crate::sync::{ResumePolicy, SyncController, SyncHandle};
use crate::transmit::TransmitLink;
use crate::transmit::broadcast_loop::{self, BroadcastOutcome, BroadcastProgress};
use crate::types::{ConfigError, SessionConfig, SharedConfig};

use super::SessionHandle;

/// A one-shot hardware-alignment broadcast
#[derive(Debug)]
pub struct MaintenanceSession {
    config: SessionConfig,
    bus: EventBus,
    shared: SharedConfig,
    shutdown_tx: Arc<watch::Sender<ShutdownLevel>>,
    shutdown_rx: watch::Receiver<ShutdownLevel>,
}

impl MaintenanceSession {
    /// Validate the configuration and assemble the session.
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

    /// Stream the test audio once and stop. Returns whether the broadcast
    /// completed naturally.
    ///
    /// # Errors
    ///
    /// Returns configuration and audio errors, both fatal for a
    /// maintenance session.
    pub async fn run(self) -> Result<bool, DacTransmitError> {
        let Self {
            config,
            bus,
            shared,
            shutdown_tx,
            shutdown_rx,
        } = self;

        let audio_path = config
            .maintenance_audio
            .clone()
            .ok_or(ConfigError::MissingMaintenanceAudio)?;
        let audio = load_audio(&audio_path).await?;
        let frames = chunk_frames(&audio);
        tracing::info!(
            file = %audio_path.display(),
            frames = frames.len(),
            "starting maintenance broadcast"
        );

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
        let sync_task = tokio::spawn(controller.run(shutdown_rx.clone()));

        // Queue the whole file up front; the loop ends when it drains.
        let progress = Arc::new(BroadcastProgress::new());
        let (frames_tx, frames_rx) = mpsc::channel(frames.len().max(1));
        for frame in frames {
            progress.frame_queued();
            if frames_tx.send(frame).await.is_err() {
                break;
            }
        }
        drop(frames_tx);

        let (halt_tx, halt_rx) = watch::channel(false);
        let reaper = tokio::spawn(reap(
            Arc::clone(&progress),
            sync.clone(),
            halt_tx,
            REAPER_GRACE,
        ));

        let link = TransmitLink::new(config.data_addr(), shared.clone()).await?;
        let (_link, outcome) =
            broadcast_loop::run(link, sync, frames_rx, Arc::clone(&progress), halt_rx).await;

        let completed = outcome == BroadcastOutcome::Finished;
        if completed {
            tracing::info!(
                frames = progress.consumed(),
                "maintenance broadcast complete"
            );
        } else {
            tracing::error!(
                ?outcome,
                remaining = progress.remaining(),
                "maintenance broadcast did not complete"
            );
        }

        let _ = shutdown_tx.send(ShutdownLevel::Immediate);
        reaper.abort();
        let _ = sync_task.await;
        Ok(completed)
    }
}
