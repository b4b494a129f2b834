//! Wire protocol for the DAC appliance
//!
//! Two channels: the data channel carries fixed-size sequenced audio frames
//! ([`frame`]), the control channel carries ASCII sync/heartbeat exchanges
//! and appliance status replies ([`status`]).

pub mod frame;
pub mod status;


pub use frame::{AudioFrame, FrameBuilder, PAYLOAD_SIZE, SEQUENCE_STEP, TIMESTAMP_STEP};
pub use status::{DacStatus, StatusParseError, VoiceStatus};
