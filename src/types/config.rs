//! Session configuration
//!
//! The immutable parts of a session (endpoints, ports, playlist directory)
//! live in [`SessionConfig`]. The parts the comms manager may change while
//! audio is flowing (transmitter set, amplitude targets, time zone) live in
//! [`RuntimeConfig`] behind [`SharedConfig`], which hands out whole-struct
//! snapshots so a frame is never built from a half-applied update.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// Number of radio channels on the appliance
pub const CHANNELS: u8 = 4;

/// Configuration errors. All of these are fatal at session start.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Transmitter number outside the appliance's channel range
    #[error("invalid transmitter channel {0}: must be 1-{CHANNELS}")]
    InvalidTransmitter(u8),

    /// No destination transmitters configured
    #[error("transmitter set is empty")]
    EmptyTransmitters,

    /// The playlist directory does not exist
    #[error("playlist directory not found: {0}")]
    PlaylistDirectoryMissing(PathBuf),

    /// Maintenance mode requires a test audio file
    #[error("maintenance session requires an audio file")]
    MissingMaintenanceAudio,

    /// The maintenance audio file does not exist or is empty
    #[error("unusable maintenance audio file: {0}")]
    UnusableMaintenanceAudio(PathBuf),
}

/// Which kind of session to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Continuous playlist-driven playback
    Normal,
    /// One-shot alignment/test broadcast that self-terminates
    Maintenance,
}

/// The set of destination transmitter channels (1-4) for outgoing frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmitterSet(Vec<u8>);

impl TransmitterSet {
    /// Build a transmitter set from channel numbers.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the set is empty or a channel is out of range.
    pub fn new(mut channels: Vec<u8>) -> Result<Self, ConfigError> {
        if channels.is_empty() {
            return Err(ConfigError::EmptyTransmitters);
        }
        for &c in &channels {
            if c == 0 || c > CHANNELS {
                return Err(ConfigError::InvalidTransmitter(c));
            }
        }
        channels.sort_unstable();
        channels.dedup();
        Ok(Self(channels))
    }

    /// Channel numbers in ascending order
    #[must_use]
    pub fn channels(&self) -> &[u8] {
        &self.0
    }

    /// Number of configured transmitters
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty. Never true for a validated set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the given channel is in the set
    #[must_use]
    pub fn contains(&self, channel: u8) -> bool {
        self.0.contains(&channel)
    }

    /// The appliance addressing bitmask: bit N-1 set for channel N
    #[must_use]
    pub fn addressing_mask(&self) -> u32 {
        self.0.iter().fold(0, |mask, &c| mask | 1 << (c - 1))
    }
}

/// Amplitude targets for the three audio classes, in appliance units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmplitudeTargets {
    /// Regular voice audio
    pub voice: u16,
    /// SAME tone audio
    pub same: u16,
    /// Alert tone audio
    pub alert: u16,
}

/// Runtime-mutable session state, always read and written as a whole
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Active destination transmitters
    pub transmitters: TransmitterSet,
    /// Active amplitude targets
    pub amplitudes: AmplitudeTargets,
    /// IANA time-zone identifier used for scheduling timestamps
    pub time_zone: String,
}

/// Shared handle to the runtime-mutable configuration.
///
/// Mutated only by the supervisory channel in response to commands; read
/// per-frame by the transmit path via [`SharedConfig::snapshot`].
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<RuntimeConfig>>,
}

impl SharedConfig {
    /// Wrap an initial runtime configuration
    #[must_use]
    pub fn new(initial: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Atomic copy of the current configuration
    pub async fn snapshot(&self) -> RuntimeConfig {
        self.inner.read().await.clone()
    }

    /// Replace the transmitter set
    pub async fn set_transmitters(&self, transmitters: TransmitterSet) {
        self.inner.write().await.transmitters = transmitters;
    }

    /// Replace all three amplitude targets in one step
    pub async fn set_amplitudes(&self, amplitudes: AmplitudeTargets) {
        self.inner.write().await.amplitudes = amplitudes;
    }

    /// Replace the time zone
    pub async fn set_time_zone(&self, time_zone: String) {
        self.inner.write().await.time_zone = time_zone;
    }
}

/// Full configuration for one transmit session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// DAC hostname as given on the command line (reported to the manager)
    pub dac_hostname: String,
    /// Resolved DAC address
    pub dac_address: IpAddr,
    /// UDP port for audio frames
    pub data_port: u16,
    /// UDP port for the status/control channel
    pub control_port: u16,
    /// Loopback TCP port of the comms manager
    pub manager_port: u16,
    /// Transmitter group this session broadcasts for
    pub transmitter_group: String,
    /// Directory scanned for playlist descriptors
    pub playlist_directory: PathBuf,
    /// Session kind
    pub mode: SessionMode,
    /// Initial transmitter set
    pub transmitters: TransmitterSet,
    /// Initial amplitude targets
    pub amplitudes: AmplitudeTargets,
    /// IANA time-zone identifier
    pub time_zone: String,
    /// Pre-baked audio for a maintenance session
    pub maintenance_audio: Option<PathBuf>,
}

impl SessionConfig {
    /// Destination for audio frames
    #[must_use]
    pub fn data_addr(&self) -> SocketAddr {
        SocketAddr::new(self.dac_address, self.data_port)
    }

    /// Destination for control/status traffic
    #[must_use]
    pub fn control_addr(&self) -> SocketAddr {
        SocketAddr::new(self.dac_address, self.control_port)
    }

    /// Initial runtime-mutable state
    #[must_use]
    pub fn runtime(&self) -> RuntimeConfig {
        RuntimeConfig {
            transmitters: self.transmitters.clone(),
            amplitudes: self.amplitudes,
            time_zone: self.time_zone.clone(),
        }
    }

    /// Validate the parts that must be right before any socket is opened.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` found; all are fatal at session start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transmitters.is_empty() {
            return Err(ConfigError::EmptyTransmitters);
        }
        if !self.playlist_directory.is_dir() && self.mode == SessionMode::Normal {
            return Err(ConfigError::PlaylistDirectoryMissing(
                self.playlist_directory.clone(),
            ));
        }
        if self.mode == SessionMode::Maintenance {
            match &self.maintenance_audio {
                None => return Err(ConfigError::MissingMaintenanceAudio),
                Some(path) => {
                    let usable = path.metadata().map(|m| m.len() > 0).unwrap_or(false);
                    if !usable {
                        return Err(ConfigError::UnusableMaintenanceAudio(path.clone()));
                    }
                }
            }
        }
        Ok(())
    }
}
