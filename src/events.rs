//! Session event bus
//!
//! A single broadcast channel distributes session-wide events to every
//! interested task: sync transitions steer the transmit loops, shutdown
//! requests unwind the session, and notifications are picked up by the
//! supervisory channel for forwarding to the comms manager.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::ipc::messages::Notification;

/// Session lifecycle level, distributed through a `watch` channel and
/// checked by every long-lived task at its natural boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownLevel {
    /// Normal operation
    Running,
    /// Stop at the next message boundary
    Graceful,
    /// Stop now, interrupting any pacing wait
    Immediate,
}

/// Events published on the session bus
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Sync with the DAC was lost; transmission must stall
    LostSync,
    /// Sync with the DAC returned after the given downtime
    RegainedSync {
        /// How long the sync was down
        downtime: Duration,
    },
    /// The comms manager (or the process itself) asked for shutdown
    ShutdownRequested {
        /// Stop mid-message instead of at the next message boundary
        now: bool,
    },
    /// An outward-facing notification to relay to the comms manager
    Notify(Notification),
}

/// Broadcast bus for [`SessionEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a new bus
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Subscribe to all session events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Dropped silently when nobody is subscribed.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Shorthand for publishing a notification
    pub fn notify(&self, notification: Notification) {
        self.emit(SessionEvent::Notify(notification));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
