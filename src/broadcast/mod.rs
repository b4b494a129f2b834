//! Live and maintenance broadcast producers
//!
//! Both feed the queue-fed transmit loop: a live broadcast streams
//! operator audio relayed by the comms manager; a maintenance broadcast
//! streams a pre-baked test file once and is watched by a reaper.

mod live;
mod reaper;


pub use live::{LIVE_QUEUE_FRAMES, LiveBroadcastControl, LiveFeed, chunk_frames};
pub use reaper::{REAPER_GRACE, reap};
