//! Message catalogue for the supervisory channel
//!
//! Everything that crosses the loopback link to the comms manager is one
//! [`IpcMessage`], serialized as JSON inside a length-delimited frame.
//! Outward status events are the [`Notification`] union; each variant
//! carries the transmitter group so the manager can route it to the right
//! display.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::status::HardwareStatus;
use crate::types::{AmplitudeTargets, TransmitterSet};

/// Session registration sent immediately after connecting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    /// Directory this session scans for playlists
    pub playlist_directory: String,
    /// UDP port frames are sent to
    pub data_port: u16,
    /// DAC the session is connected to
    pub dac_hostname: String,
    /// Transmitter group this session broadcasts for
    pub transmitter_group: String,
    /// Active transmitter channels
    pub transmitters: TransmitterSet,
    /// Active amplitude targets
    pub amplitudes: AmplitudeTargets,
}

/// Playback progress for one message, reported when it starts playing and
/// cached for snapshot replies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackStatus {
    /// Transmitter group the message played on
    pub transmitter_group: String,
    /// Broadcast message identifier
    pub broadcast_id: u64,
    /// When this play started
    pub transmit_time: DateTime<Utc>,
    /// How many times the message has played this session
    pub play_count: u32,
    /// Whether SAME tones played with this message
    pub played_same_tone: bool,
    /// Whether the alert tone played with this message
    pub played_alert_tone: bool,
}

/// Phase of a live broadcast takeover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiveBroadcastState {
    /// The live broadcast displaced playlist playback
    Started,
    /// Playlist playback resumed
    Finished,
}

/// Outward status events, forwarded to the comms manager fire-and-forget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// A message started playing
    PlaybackStatus(PlaybackStatus),

    /// A confirmation-required message is about to broadcast
    BroadcastConfirmed {
        /// Transmitter group
        transmitter_group: String,
        /// Message that will broadcast
        broadcast_id: u64,
    },

    /// Tone audio will be cut short at a frame boundary
    ToneTruncated {
        /// Transmitter group
        transmitter_group: String,
        /// Message whose tones are truncated
        broadcast_id: u64,
        /// Message name for operator display
        name: String,
    },

    /// A message's audio could not be prepared; the message was dropped
    InitFailed {
        /// Transmitter group
        transmitter_group: String,
        /// Message that failed
        broadcast_id: u64,
        /// Message name for operator display
        name: String,
        /// Whether the failed message was an interrupt
        interrupt: bool,
    },

    /// An interrupt was delayed because interrupts are currently locked out
    DelayedBroadcast {
        /// Transmitter group
        transmitter_group: String,
        /// Delayed message
        broadcast_id: u64,
        /// Message name for operator display
        name: String,
    },

    /// A message expired before it ever played
    NotBroadcast {
        /// Transmitter group
        transmitter_group: String,
        /// Message that never played
        broadcast_id: u64,
        /// When the message expired
        expired: DateTime<Utc>,
    },

    /// Noteworthy appliance hardware state
    HardwareStatus {
        /// Transmitter group
        transmitter_group: String,
        /// Snapshot of the reported hardware state
        status: HardwareStatus,
    },

    /// Unrecoverable session-level failure
    CriticalError {
        /// Transmitter group
        transmitter_group: String,
        /// Failure description
        message: String,
    },

    /// The playlist is exhausted; nothing can play
    NoPlayableMessage {
        /// Transmitter group
        transmitter_group: String,
    },

    /// A live broadcast started or finished
    LiveBroadcastSwitch {
        /// Transmitter group
        transmitter_group: String,
        /// Live broadcast identifier
        broadcast_id: String,
        /// Which side of the takeover this is
        state: LiveBroadcastState,
    },

    /// Progress/failure report for a live broadcast
    LiveBroadcastStatus {
        /// Transmitter group
        transmitter_group: String,
        /// Live broadcast identifier
        broadcast_id: String,
        /// Whether the broadcast is healthy
        success: bool,
        /// Failure detail when unhealthy
        message: Option<String>,
    },
}

impl Notification {
    /// The transmitter group this notification belongs to
    #[must_use]
    pub fn transmitter_group(&self) -> &str {
        match self {
            Notification::PlaybackStatus(status) => &status.transmitter_group,
            Notification::BroadcastConfirmed {
                transmitter_group, ..
            }
            | Notification::ToneTruncated {
                transmitter_group, ..
            }
            | Notification::InitFailed {
                transmitter_group, ..
            }
            | Notification::DelayedBroadcast {
                transmitter_group, ..
            }
            | Notification::NotBroadcast {
                transmitter_group, ..
            }
            | Notification::HardwareStatus {
                transmitter_group, ..
            }
            | Notification::CriticalError {
                transmitter_group, ..
            }
            | Notification::NoPlayableMessage { transmitter_group }
            | Notification::LiveBroadcastSwitch {
                transmitter_group, ..
            }
            | Notification::LiveBroadcastStatus {
                transmitter_group, ..
            } => transmitter_group,
        }
    }
}

/// What is currently playing, for snapshot replies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlaylistSnapshot {
    /// Status of the message currently playing, if any
    pub current: Option<PlaybackStatus>,
    /// Broadcast ids queued behind it, in play order
    pub queued: Vec<u64>,
}

/// Everything that crosses the supervisory channel, in either direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcMessage {
    /// Session → manager: session registration
    Register(Registration),

    /// Both directions: manager commands shutdown; session announces its
    /// own shutdown before closing the socket
    Shutdown {
        /// Stop immediately instead of at the next message boundary
        now: bool,
    },

    /// Session → manager: DAC connection state
    Status {
        /// Whether the session currently has sync with the DAC
        connected_to_dac: bool,
    },

    /// Manager → session: enable or disable local playlist-directory scans
    ScanPlaylists {
        /// Whether the session should scan on its own
        scan: bool,
    },

    /// Manager → session: replace the destination transmitter set
    ChangeTransmitters {
        /// New transmitter set
        transmitters: TransmitterSet,
    },

    /// Manager → session: replace all three amplitude targets
    ChangeAmplitude {
        /// New amplitude targets
        amplitudes: AmplitudeTargets,
    },

    /// Manager → session: replace the scheduling time zone
    ChangeTimeZone {
        /// IANA time-zone identifier
        time_zone: String,
    },

    /// Manager → session: ask for the current playback snapshot
    SendPlaylistRequest {
        /// Group the manager is asking about
        transmitter_group: String,
    },

    /// Session → manager: snapshot reply
    SendPlaylistResponse {
        /// Group the reply covers
        transmitter_group: String,
        /// Current playlist state; `None` when nothing is playing
        playlist: Option<PlaylistSnapshot>,
        /// Active live broadcast, if one has taken over
        live_broadcast: Option<String>,
    },

    /// Manager → session: begin a live broadcast takeover
    LiveBroadcastStart {
        /// Live broadcast identifier
        broadcast_id: String,
        /// Pre-built tone audio to play before the live stream
        tones: Vec<u8>,
    },

    /// Manager → session: one segment of live audio
    LiveBroadcastAudio {
        /// Live broadcast identifier
        broadcast_id: String,
        /// Raw µ-law audio bytes
        audio: Vec<u8>,
    },

    /// Manager → session: end the live broadcast
    LiveBroadcastStop {
        /// Live broadcast identifier
        broadcast_id: String,
    },

    /// Session → manager: forwarded notification
    Notify(Notification),
}
