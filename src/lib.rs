//! # dactransmit
//!
//! A real-time audio transmission engine for DAC broadcast appliances.
//!
//! The engine streams pre-sequenced 8 kHz µ-law audio to the appliance in
//! fixed 20 ms UDP frames, paced against feedback from the hardware's
//! jitter buffer, while a supervisory comms-manager process drives
//! startup, shutdown, transmitter assignment, and live-broadcast
//! takeover over a loopback TCP channel.
//!
//! ## Example
//!
//! ```rust,no_run
//! use dactransmit::{DacSession, SessionConfig};
//!
//! # async fn example(config: SessionConfig) -> Result<(), dactransmit::DacTransmitError> {
//! let session = DacSession::new(config)?;
//! let handle = session.handle();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     handle.shutdown(false);
//! });
//! session.run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! Long-lived tasks connected by channels:
//!
//! - **Transmit loops** ([`transmit`]) — one frame per pacing tick, with an
//!   owner-token handoff between playlist playback and live/maintenance
//!   broadcast
//! - **Sync & rate controller** ([`sync`]) — control-channel heartbeats and
//!   watermark-driven pacing
//! - **Playlist scheduler** ([`playlist`]) — interrupt priority, periodic
//!   insertion, silence filler
//! - **Supervisory channel** ([`ipc`]) — registration, commands, and
//!   fire-and-forget notifications

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Error types
pub mod error;
/// Session event bus
pub mod events;
/// Core types
pub mod types;

// Internal modules
pub mod audio;
pub mod broadcast;
pub mod ipc;
pub mod playlist;
pub mod protocol;
mod session;
pub mod sync;
pub mod transmit;

// Re-exports
pub use error::DacTransmitError;
pub use events::{EventBus, SessionEvent, ShutdownLevel};
pub use ipc::messages::{IpcMessage, Notification};
pub use protocol::frame::{AudioFrame, FrameBuilder};
pub use session::{DacSession, MaintenanceSession, SessionHandle};
pub use sync::{ResumePolicy, SyncHandle};
pub use types::{AmplitudeTargets, SessionConfig, SessionMode, TransmitterSet};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
