//! Real-time frame transmission
//!
//! One shared transmit core ([`TransmitLink`]) and two loop instantiations
//! over it: [`playlist_loop`] streams whatever the scheduler hands it;
//! [`broadcast_loop`] streams a bounded queue fed by a live or maintenance
//! producer. An explicit owner token ([`TransmitHandoff`]) guarantees at
//! most one of them is sending at any moment and carries the last frame
//! across the handoff so numbering never breaks.

pub mod broadcast_loop;
mod handoff;
mod link;
mod pacing;
pub mod playlist_loop;

#[cfg(test)]
mod tests;

pub use handoff::{LoopOwner, TransmitHandoff};
pub use link::TransmitLink;
pub use pacing::PaceInterval;
