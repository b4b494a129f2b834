//! Supervisory channel to the comms manager
//!
//! One long-lived loopback TCP connection per session carries
//! length-framed JSON messages: registration and notifications outward,
//! operator commands inward. The client reconnects forever on a fixed
//! interval; losing the link forcibly halts any live broadcast, since the
//! link is the only channel that can manage one.

mod client;
mod codec;
pub mod messages;


use std::io;

use thiserror::Error;

pub use client::{CommsClient, CommsHandles, LiveCommand};
pub use codec::IpcCodec;

/// Supervisory channel errors
#[derive(Debug, Error)]
pub enum IpcError {
    /// Socket-level failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A message failed to serialize or deserialize
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The socket connected to itself via TCP simultaneous open
    #[error("self-connection detected on port {port}")]
    SelfConnection {
        /// The manager port involved
        port: u16,
    },
}
