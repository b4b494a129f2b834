//! Playlist and message descriptors

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One broadcast message within a playlist.
///
/// The audio referenced here is already regulated 8 kHz µ-law; tone audio,
/// when present, is pre-built by the upstream pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDescriptor {
    /// Stable broadcast identifier
    pub broadcast_id: u64,
    /// Operator-facing message name
    pub name: String,
    /// Message type designation
    pub message_type: String,
    /// Pre-empt normal playback as soon as the current frame completes
    #[serde(default)]
    pub interrupt: bool,
    /// Report a broadcast confirmation before the first content frame
    #[serde(default)]
    pub confirm: bool,
    /// Whether the tone audio includes SAME tones
    #[serde(default)]
    pub same_tone: bool,
    /// Whether the tone audio includes the alert tone
    #[serde(default)]
    pub alert_tone: bool,
    /// Re-play period for periodic messages, in seconds
    #[serde(default)]
    pub period_seconds: Option<u64>,
    /// Transmitter groups the message is scheduled for; empty means all
    #[serde(default)]
    pub transmitter_groups: Vec<String>,
    /// Voice body audio file
    pub audio: PathBuf,
    /// Pre-built tone audio file played before the body
    #[serde(default)]
    pub tones: Option<PathBuf>,
    /// Drop the message once this passes
    #[serde(default)]
    pub expire: Option<DateTime<Utc>>,
}

impl MessageDescriptor {
    /// Whether the message is scheduled for broadcast on `group`
    #[must_use]
    pub fn scheduled_for(&self, group: &str) -> bool {
        self.transmitter_groups.is_empty() || self.transmitter_groups.iter().any(|g| g == group)
    }

    /// Whether the message has expired at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire.is_some_and(|e| e <= now)
    }

    /// Whether the message carries any tone audio
    #[must_use]
    pub fn has_tones(&self) -> bool {
        self.tones.is_some()
    }
}

/// One playlist descriptor file: an ordered run of messages for a group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    /// Playlist name; later files with the same name replace earlier ones
    pub name: String,
    /// Transmitter group the playlist belongs to
    pub transmitter_group: String,
    /// Larger numbers play first when playlists are merged
    #[serde(default)]
    pub priority: u8,
    /// Messages in play order
    pub messages: Vec<MessageDescriptor>,
}
