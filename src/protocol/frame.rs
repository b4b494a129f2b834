//! Audio frame codec for the DAC data channel
//!
//! The appliance speaks an RTP-like format: a 12-byte header, a one-word
//! extension carrying the transmitter addressing mask, then the previous
//! and current 160-byte payloads back to back. Carrying the previous
//! payload lets the hardware conceal a single lost datagram.

use thiserror::Error;

/// One payload is 20 ms of 8 kHz 8-bit audio
pub const PAYLOAD_SIZE: usize = 160;

/// Encoded frame size: header + extension + two payloads
pub const FRAME_SIZE: usize = 12 + 8 + 2 * PAYLOAD_SIZE;

/// Sequence numbers advance by this step per frame
pub const SEQUENCE_STEP: u16 = 1;

/// Timestamps advance by this step per frame (one sample per byte)
pub const TIMESTAMP_STEP: u32 = PAYLOAD_SIZE as u32;

/// Version 2, no padding, extension present, no CSRCs
const FLAGS: u8 = 0x90;

/// Marker clear, payload type 121
const MARKER_PAYLOAD_TYPE: u8 = 0x79;

/// Extension header id 103
const EXT_HEADER_ID: [u8; 2] = [0x00, 0x67];

/// One 32-bit word of extension data (the addressing mask)
const EXT_HEADER_LEN: [u8; 2] = [0x00, 0x01];

/// Frame decoding errors
#[derive(Debug, Error)]
pub enum FrameError {
    /// Encoded frame had the wrong length
    #[error("frame must be {FRAME_SIZE} bytes, got {0}")]
    WrongSize(usize),

    /// Header flags did not match the appliance protocol
    #[error("unexpected header bytes {0:#04x} {1:#04x}")]
    BadHeader(u8, u8),
}

/// One sequenced, timestamped audio frame
#[derive(Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Frame sequence number (wrapping)
    pub sequence: u16,
    /// Sample timestamp (wrapping)
    pub timestamp: u32,
    /// Session identifier, fixed for the life of the session
    pub ssrc: u32,
    /// Transmitter addressing mask (bit N-1 = channel N)
    pub addressing: u32,
    /// Payload of the frame sent before this one
    pub previous_payload: [u8; PAYLOAD_SIZE],
    /// Payload carried by this frame
    pub current_payload: [u8; PAYLOAD_SIZE],
}

impl std::fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFrame")
            .field("sequence", &self.sequence)
            .field("timestamp", &self.timestamp)
            .field("ssrc", &self.ssrc)
            .field("addressing", &format_args!("{:#06b}", self.addressing))
            .finish_non_exhaustive()
    }
}

impl AudioFrame {
    /// Encode the frame for transmission
    #[must_use]
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut buf = [0u8; FRAME_SIZE];

        buf[0] = FLAGS;
        buf[1] = MARKER_PAYLOAD_TYPE;
        buf[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        buf[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        buf[12..14].copy_from_slice(&EXT_HEADER_ID);
        buf[14..16].copy_from_slice(&EXT_HEADER_LEN);
        buf[16..20].copy_from_slice(&self.addressing.to_be_bytes());

        buf[20..20 + PAYLOAD_SIZE].copy_from_slice(&self.previous_payload);
        buf[20 + PAYLOAD_SIZE..].copy_from_slice(&self.current_payload);

        buf
    }

    /// Decode an encoded frame.
    ///
    /// # Errors
    ///
    /// Returns `FrameError` if the length or header bytes are wrong.
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() != FRAME_SIZE {
            return Err(FrameError::WrongSize(buf.len()));
        }
        if buf[0] != FLAGS || buf[1] != MARKER_PAYLOAD_TYPE {
            return Err(FrameError::BadHeader(buf[0], buf[1]));
        }

        let mut previous_payload = [0u8; PAYLOAD_SIZE];
        let mut current_payload = [0u8; PAYLOAD_SIZE];
        previous_payload.copy_from_slice(&buf[20..20 + PAYLOAD_SIZE]);
        current_payload.copy_from_slice(&buf[20 + PAYLOAD_SIZE..]);

        Ok(Self {
            sequence: u16::from_be_bytes([buf[2], buf[3]]),
            timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            addressing: u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]),
            previous_payload,
            current_payload,
        })
    }
}

/// Builds successive frames with continuous numbering.
///
/// The same builder logic serves the playlist, live, and maintenance paths
/// so the appliance's sequence validation never sees a difference between
/// them.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    ssrc: u32,
}

impl FrameBuilder {
    /// Create a builder with a random session identifier
    #[must_use]
    pub fn new() -> Self {
        Self {
            ssrc: rand::random(),
        }
    }

    /// Create a builder with a fixed session identifier
    #[must_use]
    pub fn with_ssrc(ssrc: u32) -> Self {
        Self { ssrc }
    }

    /// Session identifier stamped on every frame
    #[must_use]
    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Build the frame that follows `previous`.
    ///
    /// With a previous frame, sequence and timestamp advance by the fixed
    /// steps and the previous payload is carried forward. Without one,
    /// numbering starts from the session baseline and the previous-payload
    /// slot is silence.
    #[must_use]
    pub fn next_frame(
        &self,
        previous: Option<&AudioFrame>,
        payload: &[u8; PAYLOAD_SIZE],
        addressing: u32,
    ) -> AudioFrame {
        match previous {
            Some(prev) => AudioFrame {
                sequence: prev.sequence.wrapping_add(SEQUENCE_STEP),
                timestamp: prev.timestamp.wrapping_add(TIMESTAMP_STEP),
                ssrc: prev.ssrc,
                addressing,
                previous_payload: prev.current_payload,
                current_payload: *payload,
            },
            None => AudioFrame {
                sequence: 0,
                timestamp: 0,
                ssrc: self.ssrc,
                addressing,
                previous_payload: [crate::audio::SILENCE_BYTE; PAYLOAD_SIZE],
                current_payload: *payload,
            },
        }
    }
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}
