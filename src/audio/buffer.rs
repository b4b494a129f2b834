//! Frame-granular view over a message's audio bytes

use bytes::Bytes;

use super::SILENCE_BYTE;
use crate::protocol::frame::PAYLOAD_SIZE;

/// Playable audio for one message: an optional tone section followed by the
/// voice body, consumed in 160-byte frames.
///
/// Positions only ever move in whole frames; the final partial frame is
/// padded with µ-law silence.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    tones: Bytes,
    body: Bytes,
    /// Whether the tone section plays on this pass
    play_tones: bool,
    /// Bytes consumed so far
    position: usize,
    /// Hard stop, in frames, when the broadcast window cuts the audio short
    frame_limit: Option<usize>,
}

impl AudioBuffer {
    /// Wrap body audio with no tone section
    #[must_use]
    pub fn new(body: Bytes) -> Self {
        Self::with_tones(Bytes::new(), body)
    }

    /// Wrap tone audio and body audio
    #[must_use]
    pub fn with_tones(tones: Bytes, body: Bytes) -> Self {
        Self {
            play_tones: !tones.is_empty(),
            tones,
            body,
            position: 0,
            frame_limit: None,
        }
    }

    /// Skip the tone section on this pass (replayed messages do not re-alert)
    pub fn set_play_tones(&mut self, play: bool) {
        self.play_tones = play && !self.tones.is_empty();
    }

    /// Whether the tone section plays on this pass
    #[must_use]
    pub fn plays_tones(&self) -> bool {
        self.play_tones
    }

    /// Cut playback at a frame boundary before the natural end
    pub fn truncate_frames(&mut self, frames: usize) {
        self.frame_limit = Some(frames);
    }

    /// Total playable bytes on this pass
    #[must_use]
    pub fn len(&self) -> usize {
        let natural = if self.play_tones {
            self.tones.len() + self.body.len()
        } else {
            self.body.len()
        };
        match self.frame_limit {
            Some(frames) => natural.min(frames * PAYLOAD_SIZE),
            None => natural,
        }
    }

    /// Whether there is nothing to play
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total playable frames on this pass, counting the padded tail frame
    #[must_use]
    pub fn total_frames(&self) -> usize {
        self.len().div_ceil(PAYLOAD_SIZE)
    }

    /// Frames consumed so far
    #[must_use]
    pub fn position_frames(&self) -> usize {
        self.position / PAYLOAD_SIZE
    }

    /// Whether any playable bytes remain
    #[must_use]
    pub fn has_remaining(&self) -> bool {
        self.position < self.len()
    }

    /// Whether the current position is inside the tone section
    #[must_use]
    pub fn in_tones(&self) -> bool {
        self.play_tones && self.position < self.tones.len()
    }

    /// Whether the frame limit will cut the natural audio short
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        match self.frame_limit {
            Some(frames) => {
                let natural = if self.play_tones {
                    self.tones.len() + self.body.len()
                } else {
                    self.body.len()
                };
                frames * PAYLOAD_SIZE < natural
            }
            None => false,
        }
    }

    /// Restart from the beginning
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// Jump to a frame boundary. Positions past the end land at the end.
    pub fn seek_frames(&mut self, frames: usize) {
        self.position = (frames * PAYLOAD_SIZE).min(self.len());
    }

    fn byte_at(&self, index: usize) -> u8 {
        if self.play_tones {
            if index < self.tones.len() {
                self.tones[index]
            } else {
                self.body[index - self.tones.len()]
            }
        } else {
            self.body[index]
        }
    }

    /// Copy the next frame's payload into `dst`, padding the tail with
    /// silence, and advance one frame. Returns `false` without touching
    /// `dst` when nothing remains.
    pub fn fill_frame(&mut self, dst: &mut [u8; PAYLOAD_SIZE]) -> bool {
        let len = self.len();
        if self.position >= len {
            return false;
        }

        let available = (len - self.position).min(PAYLOAD_SIZE);
        for (i, slot) in dst.iter_mut().enumerate().take(available) {
            *slot = self.byte_at(self.position + i);
        }
        dst[available..].fill(SILENCE_BYTE);
        self.position += available;
        true
    }
}
