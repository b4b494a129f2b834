//! Shared transmit core: socket, framing, per-transmitter fan-out

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::protocol::frame::{AudioFrame, FrameBuilder, PAYLOAD_SIZE};
use crate::types::SharedConfig;

/// Owns the outbound data socket and the frame continuation state for one
/// transmit loop instantiation.
///
/// Each frame is built against an atomic snapshot of the runtime
/// configuration and the encoded datagram is sent once per configured
/// transmitter (multicast by replication).
pub struct TransmitLink {
    socket: UdpSocket,
    dest: SocketAddr,
    builder: FrameBuilder,
    previous: Option<AudioFrame>,
    shared: SharedConfig,
}

impl TransmitLink {
    /// Bind a fresh data socket toward the DAC.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the socket cannot be bound.
    pub async fn new(dest: SocketAddr, shared: SharedConfig) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        Ok(Self {
            socket,
            dest,
            builder: FrameBuilder::new(),
            previous: None,
            shared,
        })
    }

    /// Continue numbering from a frame sent by the other instantiation
    pub fn seed(&mut self, frame: Option<AudioFrame>) {
        if frame.is_some() {
            self.previous = frame;
        }
    }

    /// The last frame built by this link
    #[must_use]
    pub fn last_frame(&self) -> Option<&AudioFrame> {
        self.previous.as_ref()
    }

    /// Clone of the last frame, for handing to the other instantiation
    #[must_use]
    pub fn take_last(&self) -> Option<AudioFrame> {
        self.previous.clone()
    }

    /// Build the next frame around `payload` and send it to every
    /// configured transmitter.
    ///
    /// Numbering advances even if the send fails, so a retried broadcast
    /// never regresses the sequence.
    ///
    /// # Errors
    ///
    /// Returns the first socket error; the caller decides whether that
    /// halts the broadcast.
    pub async fn transmit(&mut self, payload: &[u8; PAYLOAD_SIZE]) -> std::io::Result<()> {
        let snapshot = self.shared.snapshot().await;
        let frame = self.builder.next_frame(
            self.previous.as_ref(),
            payload,
            snapshot.transmitters.addressing_mask(),
        );
        let encoded = frame.encode();
        self.previous = Some(frame);

        for _ in snapshot.transmitters.channels() {
            self.socket.send_to(&encoded, self.dest).await?;
        }
        Ok(())
    }
}
