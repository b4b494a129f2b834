//! Playlist-driven message scheduling
//!
//! Playlists arrive as JSON descriptor files in the session's playlist
//! directory. The scheduler decides, frame by frame, which message feeds
//! the transmit loop: interrupts pre-empt at the next frame boundary,
//! periodic messages re-enter when due, and messages not scheduled for the
//! active transmitter group are skipped without producing dead air.

mod cursor;
mod directory;
mod message;
mod scheduler;

#[cfg(test)]
mod tests;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use cursor::{MessagePlayback, PlaybackCursor};
pub use directory::{PlaylistScanner, PlaylistUpdate, ScanControl, initial_scan};
pub use message::{MessageDescriptor, Playlist};
pub use scheduler::{InterruptLock, PlaylistScheduler};

/// Playlist loading failures
#[derive(Debug, Error)]
pub enum PlaylistError {
    /// A playlist descriptor failed to parse
    #[error("malformed playlist descriptor {path}: {source}")]
    Descriptor {
        /// Descriptor file
        path: PathBuf,
        /// Parse failure
        #[source]
        source: serde_json::Error,
    },

    /// The playlist directory could not be scanned
    #[error("failed to scan playlist directory {path}: {source}")]
    Scan {
        /// Directory being scanned
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}
