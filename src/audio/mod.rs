//! Pre-regulated audio handling
//!
//! The engine never synthesizes or converts audio: messages arrive as
//! already-regulated 8 kHz µ-law byte buffers, optionally preceded by
//! pre-built tone audio. This module only slices those buffers into
//! 20 ms frames.

mod buffer;

#[cfg(test)]
mod tests;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use buffer::AudioBuffer;

/// µ-law silence
pub const SILENCE_BYTE: u8 = 0xFF;

/// Audio retrieval/preparation failures. Fatal to the broadcast that
/// needed the audio.
#[derive(Debug, Error)]
pub enum AudioError {
    /// The audio file could not be read
    #[error("failed to read audio {path}: {source}")]
    Retrieve {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The audio file was empty
    #[error("audio file {path} is empty")]
    Empty {
        /// File that was empty
        path: PathBuf,
    },
}

/// Read a message's audio bytes from disk.
///
/// # Errors
///
/// Returns `AudioError` if the file is unreadable or empty.
pub async fn load_audio(path: &std::path::Path) -> Result<bytes::Bytes, AudioError> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|source| AudioError::Retrieve {
            path: path.to_path_buf(),
            source,
        })?;
    if data.is_empty() {
        return Err(AudioError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(bytes::Bytes::from(data))
}
