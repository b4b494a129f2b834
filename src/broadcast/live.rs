//! Live broadcast registry and audio feed

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};

use crate::audio::SILENCE_BYTE;
use crate::protocol::frame::PAYLOAD_SIZE;
use crate::transmit::broadcast_loop::{BroadcastProgress, FramePayload};

/// Bounded live queue: about five seconds of audio
pub const LIVE_QUEUE_FRAMES: usize = 256;

/// Split raw audio bytes into frame payloads, padding the tail with
/// silence
#[must_use]
pub fn chunk_frames(audio: &[u8]) -> Vec<FramePayload> {
    audio
        .chunks(PAYLOAD_SIZE)
        .map(|chunk| {
            let mut payload = [SILENCE_BYTE; PAYLOAD_SIZE];
            payload[..chunk.len()].copy_from_slice(chunk);
            payload
        })
        .collect()
}

/// Producer-side handle for one active live broadcast
#[derive(Debug)]
pub struct LiveFeed {
    /// Live broadcast identifier
    pub broadcast_id: String,
    audio_tx: mpsc::Sender<FramePayload>,
    halt_tx: watch::Sender<bool>,
    progress: Arc<BroadcastProgress>,
}

impl LiveFeed {
    /// Queue audio bytes for transmission. Frames that do not fit in the
    /// bounded queue are dropped with a warning; a live source that
    /// overruns the queue is already unrecoverable.
    pub fn push_audio(&self, audio: &[u8]) {
        for payload in chunk_frames(audio) {
            match self.audio_tx.try_send(payload) {
                Ok(()) => self.progress.frame_queued(),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        broadcast_id = %self.broadcast_id,
                        "live audio queue full, dropping frame"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return,
            }
        }
    }
}

#[derive(Debug)]
struct ActiveLive {
    feed: LiveFeed,
}

/// Tracks the at-most-one active live broadcast and provides the halt
/// path used when the supervisory link dies.
#[derive(Debug, Clone, Default)]
pub struct LiveBroadcastControl {
    inner: Arc<Mutex<Option<ActiveLive>>>,
}

impl LiveBroadcastControl {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a starting live broadcast. Returns the queue receiver for
    /// the transmit loop and the halt receiver, or `None` if another live
    /// broadcast is already active.
    #[must_use]
    pub fn begin(
        &self,
        broadcast_id: &str,
        progress: Arc<BroadcastProgress>,
    ) -> Option<(mpsc::Receiver<FramePayload>, watch::Receiver<bool>)> {
        let mut inner = self.inner.lock().expect("live registry lock poisoned");
        if inner.is_some() {
            return None;
        }
        let (audio_tx, audio_rx) = mpsc::channel(LIVE_QUEUE_FRAMES);
        let (halt_tx, halt_rx) = watch::channel(false);
        *inner = Some(ActiveLive {
            feed: LiveFeed {
                broadcast_id: broadcast_id.to_string(),
                audio_tx,
                halt_tx,
                progress,
            },
        });
        Some((audio_rx, halt_rx))
    }

    /// The active broadcast id, if any
    #[must_use]
    pub fn active_id(&self) -> Option<String> {
        self.inner
            .lock()
            .expect("live registry lock poisoned")
            .as_ref()
            .map(|a| a.feed.broadcast_id.clone())
    }

    /// Queue audio for the active broadcast. Audio for any other id is
    /// dropped with a warning.
    pub fn push_audio(&self, broadcast_id: &str, audio: &[u8]) {
        let inner = self.inner.lock().expect("live registry lock poisoned");
        match inner.as_ref() {
            Some(active) if active.feed.broadcast_id == broadcast_id => {
                active.feed.push_audio(audio);
            }
            _ => {
                tracing::warn!(broadcast_id, "live audio for an inactive broadcast, dropping");
            }
        }
    }

    /// The producer is done: close the queue so the loop finishes once it
    /// drains.
    pub fn finish(&self, broadcast_id: &str) {
        let mut inner = self.inner.lock().expect("live registry lock poisoned");
        if inner
            .as_ref()
            .is_some_and(|a| a.feed.broadcast_id == broadcast_id)
        {
            // Dropping the sender closes the queue.
            *inner = None;
        }
    }

    /// Forcibly halt whatever live broadcast is active. Returns the halted
    /// id, or `None` when nothing was active, so a supervisory-link loss
    /// issues exactly one halt.
    pub fn halt_active(&self) -> Option<String> {
        let mut inner = self.inner.lock().expect("live registry lock poisoned");
        let active = inner.take()?;
        let _ = active.feed.halt_tx.send(true);
        Some(active.feed.broadcast_id)
    }

    /// Drop the registration once the transmit loop has fully finished.
    /// Safe to call after a halt or finish.
    pub fn clear(&self, broadcast_id: &str) {
        let mut inner = self.inner.lock().expect("live registry lock poisoned");
        if inner
            .as_ref()
            .is_some_and(|a| a.feed.broadcast_id == broadcast_id)
        {
            *inner = None;
        }
    }
}
