//! Per-message playback position

use crate::audio::AudioBuffer;
use crate::ipc::messages::PlaybackStatus;
use crate::protocol::frame::PAYLOAD_SIZE;

use super::message::MessageDescriptor;

/// Position state for the message currently feeding the transmit loop.
///
/// Owned exclusively by the scheduler side; the transmit loop reads audio
/// only through [`PlaybackCursor::fill_frame`], which also surfaces the
/// playback-status delta exactly once, on the first frame.
#[derive(Debug)]
pub struct PlaybackCursor {
    audio: AudioBuffer,
    /// Status delta handed out on the first fill
    pending_status: Option<PlaybackStatus>,
    interrupt: bool,
    requires_confirmation: bool,
    truncation_notice: bool,
}

impl PlaybackCursor {
    /// Build a cursor over prepared audio
    #[must_use]
    pub fn new(
        audio: AudioBuffer,
        status: PlaybackStatus,
        interrupt: bool,
        requires_confirmation: bool,
    ) -> Self {
        // Only tone audio being cut short warrants the operator warning.
        let truncation_notice = audio.is_truncated() && audio.plays_tones();
        Self {
            audio,
            pending_status: Some(status),
            interrupt,
            requires_confirmation,
            truncation_notice,
        }
    }

    /// A cursor over filler audio that reports nothing
    #[must_use]
    pub fn filler(audio: AudioBuffer) -> Self {
        Self {
            audio,
            pending_status: None,
            interrupt: false,
            requires_confirmation: false,
            truncation_notice: false,
        }
    }

    /// Whether this message pre-empts normal playback
    #[must_use]
    pub fn interrupt(&self) -> bool {
        self.interrupt
    }

    /// Whether a broadcast confirmation must go out before the first frame
    #[must_use]
    pub fn requires_confirmation(&self) -> bool {
        self.requires_confirmation
    }

    /// Whether the tone audio will be cut short
    #[must_use]
    pub fn truncation_notice(&self) -> bool {
        self.truncation_notice
    }

    /// Whether playable audio remains
    #[must_use]
    pub fn has_remaining(&self) -> bool {
        self.audio.has_remaining()
    }

    /// Frames consumed so far
    #[must_use]
    pub fn position_frames(&self) -> usize {
        self.audio.position_frames()
    }

    /// Copy the next frame into `dst` and return the status delta if this
    /// was the first frame of the message. Returns `None` in the payload
    /// position when nothing remains.
    pub fn fill_frame(&mut self, dst: &mut [u8; PAYLOAD_SIZE]) -> (bool, Option<PlaybackStatus>) {
        if !self.audio.fill_frame(dst) {
            return (false, None);
        }
        (true, self.pending_status.take())
    }

    /// Restart the message from the beginning after a long desync. The
    /// already-reported status delta is not re-reported.
    pub fn restart(&mut self) {
        self.audio.rewind();
    }
}

/// A cursor plus the identity needed for notifications about it
#[derive(Debug)]
pub struct MessagePlayback {
    /// The playback cursor
    pub cursor: PlaybackCursor,
    /// Descriptor of the message being played; `None` for filler audio
    pub descriptor: Option<MessageDescriptor>,
}

impl MessagePlayback {
    /// Playback of a real message
    #[must_use]
    pub fn message(cursor: PlaybackCursor, descriptor: MessageDescriptor) -> Self {
        Self {
            cursor,
            descriptor: Some(descriptor),
        }
    }

    /// Silence filler playback
    #[must_use]
    pub fn filler(cursor: PlaybackCursor) -> Self {
        Self {
            cursor,
            descriptor: None,
        }
    }

    /// Whether this is the silence filler
    #[must_use]
    pub fn is_filler(&self) -> bool {
        self.descriptor.is_none()
    }
}
