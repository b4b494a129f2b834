use std::io;
use thiserror::Error;

use crate::audio::AudioError;
use crate::ipc::IpcError;
use crate::playlist::PlaylistError;
use crate::protocol::frame::FrameError;
use crate::protocol::status::StatusParseError;
use crate::types::config::ConfigError;

/// Errors that can occur while running a transmit session
#[derive(Debug, Error)]
pub enum DacTransmitError {
    /// Session configuration was invalid or incomplete. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Audio retrieval or preparation failed. Fatal to the current broadcast.
    #[error("audio error: {0}")]
    Audio(#[from] AudioError),

    /// Frame construction or encoding failed
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A status message from the DAC could not be parsed
    #[error("DAC status error: {0}")]
    Status(#[from] StatusParseError),

    /// Playlist loading or scheduling failed
    #[error("playlist error: {0}")]
    Playlist(#[from] PlaylistError),

    /// Supervisory channel error
    #[error("comms manager channel error: {0}")]
    Ipc(#[from] IpcError),

    /// Socket-level I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The session was asked to do something incompatible with its state
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the conflict
        message: String,
    },
}

impl DacTransmitError {
    /// Whether this error is fatal to the whole session rather than to a
    /// single broadcast.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, DacTransmitError::Config(_))
    }
}
