//! Frame pacing intervals

use std::time::Duration;

/// How long to wait between frames.
///
/// The default matches the 20 ms of audio each frame carries. The rate
/// controller engages the fast interval to refill a draining hardware
/// buffer and the slow interval to bleed down an over-full one; frames are
/// never skipped outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaceInterval {
    /// Catch-up rate after a stall
    Fast,
    /// One frame per 20 ms of audio
    #[default]
    Default,
    /// Drain rate for an over-full hardware buffer
    Slow,
}

impl PaceInterval {
    /// The wall-clock duration of this interval
    #[must_use]
    pub const fn duration(self) -> Duration {
        match self {
            PaceInterval::Fast => Duration::from_millis(10),
            PaceInterval::Default => Duration::from_millis(20),
            PaceInterval::Slow => Duration::from_millis(25),
        }
    }
}
