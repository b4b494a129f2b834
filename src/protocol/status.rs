//! DAC control-channel status messages
//!
//! After the initial sync the appliance sends an ASCII heartbeat on the
//! control channel every 100 ms: a `'0'` indicator followed by ten
//! comma-separated fields. We parse it into [`DacStatus`] and diff
//! consecutive statuses into [`HardwareStatus`] reports for the comms
//! manager.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TransmitterSet;

/// Control-channel message that clears the appliance jitter buffer
pub const CLEAR_BUFFER_MSG: &[u8] = b"5000";

/// Control-channel message that establishes the session sync
pub const INITIAL_SYNC_MSG: &[u8] = b"01000";

/// Control-channel heartbeat that maintains the session sync
pub const HEARTBEAT_MSG: &[u8] = b"00000";

/// The appliance jitter buffer holds at most this many frames
pub const JITTER_BUFFER_CAPACITY: u16 = 256;

/// Occupancy at or below this is reported as a hardware alert
pub const ALERT_LOW_OCCUPANCY: u8 = 5;

/// Occupancy at or above this is reported as a hardware alert
pub const ALERT_HIGH_OCCUPANCY: u8 = 50;

const STATUS_INDICATOR: char = '0';
const NO_VOLTAGE: &str = "----";
const TOKEN_COUNT: usize = 10;
const RADIOS: usize = 4;

/// Errors raised while parsing an appliance status message
#[derive(Debug, Error)]
pub enum StatusParseError {
    /// The message did not start with the status indicator
    #[error("not a DAC heartbeat/status message")]
    NotAStatus,

    /// Wrong number of comma-separated fields
    #[error("expected {TOKEN_COUNT} status fields, found {0}")]
    WrongFieldCount(usize),

    /// A field failed to parse
    #[error("malformed {field} field: {value:?}")]
    MalformedField {
        /// Which field was malformed
        field: &'static str,
        /// The offending text
        value: String,
    },
}

/// Per-channel audio detection state reported by the appliance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceStatus {
    /// No audio being broadcast
    Silence,
    /// Broadcasting the IP audio stream
    IpAudio,
    /// Broadcasting the maintenance message
    Maintenance,
}

impl VoiceStatus {
    /// Map an appliance status code
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Silence),
            1 => Some(Self::IpAudio),
            2 => Some(Self::Maintenance),
            _ => None,
        }
    }
}

/// Hardware status snapshot reported to the comms manager when something
/// noteworthy changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareStatus {
    /// PSU 1 voltage, `None` when offline
    pub psu1_voltage: Option<f64>,
    /// PSU 2 voltage, `None` when offline
    pub psu2_voltage: Option<f64>,
    /// Jitter-buffer occupancy in frames
    pub buffer_occupancy: u8,
    /// The channels the report covers
    pub channels: Vec<u8>,
    /// Output gain per covered channel
    pub output_gain: Vec<f64>,
    /// Voice status per covered channel
    pub voice_status: Vec<VoiceStatus>,
    /// Recoverable packet errors since the last status
    pub recoverable_errors: u32,
    /// Unrecoverable packet errors since the last status
    pub unrecoverable_errors: u32,
}

/// One parsed appliance heartbeat/status message
#[derive(Debug, Clone, PartialEq)]
pub struct DacStatus {
    /// PSU 1 voltage, `None` when the supply reports offline
    pub psu1_voltage: Option<f64>,
    /// PSU 2 voltage, `None` when the supply reports offline
    pub psu2_voltage: Option<f64>,
    /// Session jitter-buffer occupancy in frames, folded into 0..=255
    pub buffer_occupancy: u8,
    /// Output gain for each of the four radios
    pub output_gain: [f64; RADIOS],
    /// Voice status for each of the four radios
    pub voice_status: [VoiceStatus; RADIOS],
    /// Recoverable packet errors since the previous status
    pub recoverable_errors: u32,
    /// Unrecoverable packet errors since the previous status
    pub unrecoverable_errors: u32,
}

fn parse_voltage(token: &str) -> Result<Option<f64>, StatusParseError> {
    if token == NO_VOLTAGE {
        return Ok(None);
    }
    // The reading carries a trailing unit character, e.g. "13.8V".
    let digits = &token[..token.len().saturating_sub(1)];
    digits
        .parse::<f64>()
        .map(Some)
        .map_err(|_| StatusParseError::MalformedField {
            field: "PSU voltage",
            value: token.to_string(),
        })
}

impl DacStatus {
    /// Parse a raw control-channel message.
    ///
    /// # Errors
    ///
    /// Returns `StatusParseError` if the message is not a status message or
    /// any field is malformed.
    pub fn parse(raw: &str) -> Result<Self, StatusParseError> {
        if !raw.starts_with(STATUS_INDICATOR) {
            return Err(StatusParseError::NotAStatus);
        }

        let tokens: Vec<&str> = raw[1..].split(',').collect();
        if tokens.len() != TOKEN_COUNT {
            return Err(StatusParseError::WrongFieldCount(tokens.len()));
        }

        let psu1_voltage = parse_voltage(tokens[0])?;
        let psu2_voltage = parse_voltage(tokens[1])?;

        let raw_occupancy: i32 =
            tokens[2]
                .parse()
                .map_err(|_| StatusParseError::MalformedField {
                    field: "buffer occupancy",
                    value: tokens[2].to_string(),
                })?;
        // Appliances have been seen reporting occupancy outside 0..=255.
        let folded = raw_occupancy.rem_euclid(i32::from(JITTER_BUFFER_CAPACITY));
        if folded != raw_occupancy {
            tracing::warn!(
                raw_occupancy,
                folded,
                "buffer occupancy outside valid range, folded"
            );
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let buffer_occupancy = folded as u8;

        let mut output_gain = [0.0; RADIOS];
        for (i, slot) in output_gain.iter_mut().enumerate() {
            *slot = tokens[3 + i]
                .parse()
                .map_err(|_| StatusParseError::MalformedField {
                    field: "output gain",
                    value: tokens[3 + i].to_string(),
                })?;
        }

        let detect = tokens[7];
        if detect.len() != RADIOS || !detect.is_ascii() {
            return Err(StatusParseError::MalformedField {
                field: "voice status",
                value: detect.to_string(),
            });
        }
        let mut voice_status = [VoiceStatus::Silence; RADIOS];
        for (i, c) in detect.bytes().enumerate() {
            voice_status[i] = VoiceStatus::from_code(c.wrapping_sub(b'0')).ok_or_else(|| {
                StatusParseError::MalformedField {
                    field: "voice status",
                    value: detect.to_string(),
                }
            })?;
        }

        let recoverable_errors =
            tokens[8]
                .parse()
                .map_err(|_| StatusParseError::MalformedField {
                    field: "recoverable packet errors",
                    value: tokens[8].to_string(),
                })?;
        let unrecoverable_errors =
            tokens[9]
                .parse()
                .map_err(|_| StatusParseError::MalformedField {
                    field: "unrecoverable packet errors",
                    value: tokens[9].to_string(),
                })?;

        Ok(Self {
            psu1_voltage,
            psu2_voltage,
            buffer_occupancy,
            output_gain,
            voice_status,
            recoverable_errors,
            unrecoverable_errors,
        })
    }

    /// Whether the occupancy is outside the acceptable band
    #[must_use]
    pub fn occupancy_alert(&self) -> bool {
        self.buffer_occupancy <= ALERT_LOW_OCCUPANCY
            || self.buffer_occupancy >= ALERT_HIGH_OCCUPANCY
    }

    /// Compare against the previous status and decide whether the change is
    /// worth reporting to the comms manager. The first status after sync is
    /// always reported to establish a baseline.
    #[must_use]
    pub fn delta_report(
        &self,
        previous: Option<&DacStatus>,
        transmitters: &TransmitterSet,
    ) -> Option<HardwareStatus> {
        let mut report = previous.is_none();

        if let Some(prev) = previous {
            if self.psu1_voltage.is_none() != prev.psu1_voltage.is_none() {
                if self.psu1_voltage.is_none() {
                    tracing::error!("DAC power supply 1 is offline");
                } else {
                    tracing::info!("DAC power supply 1 is back online");
                }
                report = true;
            }
            if self.psu2_voltage.is_none() != prev.psu2_voltage.is_none() {
                if self.psu2_voltage.is_none() {
                    tracing::error!("DAC power supply 2 is offline");
                } else {
                    tracing::info!("DAC power supply 2 is back online");
                }
                report = true;
            }

            if self.occupancy_alert() || prev.occupancy_alert() {
                if self.occupancy_alert() {
                    tracing::error!(
                        occupancy = self.buffer_occupancy,
                        previous = prev.buffer_occupancy,
                        "DAC jitter buffer outside acceptable thresholds"
                    );
                } else {
                    tracing::info!(
                        occupancy = self.buffer_occupancy,
                        "DAC jitter buffer back within acceptable thresholds"
                    );
                }
                report = true;
            }

            if self.recoverable_errors > 0 {
                tracing::warn!(
                    count = self.recoverable_errors,
                    "recoverable packet errors since last status"
                );
                report = true;
            }
            if self.unrecoverable_errors > 0 {
                tracing::error!(
                    count = self.unrecoverable_errors,
                    "unrecoverable packet errors since last status"
                );
                report = true;
            }
        }

        for &channel in transmitters.channels() {
            let index = usize::from(channel - 1);
            match previous {
                Some(prev) => {
                    if self.voice_status[index] != prev.voice_status[index] {
                        if self.voice_status[index] == VoiceStatus::IpAudio {
                            tracing::info!(channel, "DAC channel resumed broadcasting IP audio");
                        } else {
                            tracing::warn!(
                                channel,
                                status = ?self.voice_status[index],
                                "DAC channel stopped broadcasting IP audio"
                            );
                        }
                        report = true;
                    }
                }
                None => {
                    if self.voice_status[index] != VoiceStatus::IpAudio {
                        tracing::warn!(
                            channel,
                            status = ?self.voice_status[index],
                            "DAC channel is not receiving the audio stream"
                        );
                    }
                }
            }
        }

        report.then(|| self.to_hardware_status(transmitters))
    }

    /// Project this status onto the active channels for reporting
    #[must_use]
    pub fn to_hardware_status(&self, transmitters: &TransmitterSet) -> HardwareStatus {
        let channels: Vec<u8> = transmitters.channels().to_vec();
        let output_gain = channels
            .iter()
            .map(|&c| self.output_gain[usize::from(c - 1)])
            .collect();
        let voice_status = channels
            .iter()
            .map(|&c| self.voice_status[usize::from(c - 1)])
            .collect();

        HardwareStatus {
            psu1_voltage: self.psu1_voltage,
            psu2_voltage: self.psu2_voltage,
            buffer_occupancy: self.buffer_occupancy,
            channels,
            output_gain,
            voice_status,
            recoverable_errors: self.recoverable_errors,
            unrecoverable_errors: self.unrecoverable_errors,
        }
    }
}
