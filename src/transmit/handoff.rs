//! Owner-token handoff between the two transmit loop instantiations
//!
//! The token identifies which loop owns the right to send. A takeover is a
//! three-step exchange: the taker requests the token, the owner lends it at
//! a frame boundary together with its last-sent frame, and the taker
//! returns it with its own last frame when done. The lender sits parked in
//! [`TransmitHandoff::lend`] for the whole takeover, so at most one loop
//! ever sends.

use std::sync::Mutex;

use tokio::sync::Notify;

use crate::protocol::frame::AudioFrame;

/// The two producers that can own the transmit token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOwner {
    /// Normal playlist playback
    Playlist,
    /// Live or maintenance broadcast
    Broadcast,
}

#[derive(Debug)]
struct Inner {
    owner: LoopOwner,
    pending: Option<LoopOwner>,
    /// Last frame sent by whichever side last held the token
    frame: Option<AudioFrame>,
}

/// Shared handoff state
#[derive(Debug)]
pub struct TransmitHandoff {
    inner: Mutex<Inner>,
    granted: Notify,
    returned: Notify,
}

impl TransmitHandoff {
    /// Create a handoff with the given initial owner
    #[must_use]
    pub fn new(initial: LoopOwner) -> Self {
        Self {
            inner: Mutex::new(Inner {
                owner: initial,
                pending: None,
                frame: None,
            }),
            granted: Notify::new(),
            returned: Notify::new(),
        }
    }

    /// Which loop currently owns the token
    #[must_use]
    pub fn owner(&self) -> LoopOwner {
        self.inner.lock().expect("handoff lock poisoned").owner
    }

    /// Whether another producer has requested the token from `me`.
    /// Checked by the owning loop at frame boundaries.
    #[must_use]
    pub fn yield_requested(&self, me: LoopOwner) -> bool {
        let inner = self.inner.lock().expect("handoff lock poisoned");
        inner.owner == me && inner.pending.is_some_and(|p| p != me)
    }

    /// Request the token. Resolves once the owner lends it (immediately if
    /// `me` already owns it), returning the lender's last frame so the new
    /// producer continues the numbering.
    pub async fn acquire(&self, me: LoopOwner) -> Option<AudioFrame> {
        {
            let mut inner = self.inner.lock().expect("handoff lock poisoned");
            if inner.owner == me {
                return inner.frame.clone();
            }
            inner.pending = Some(me);
        }

        loop {
            let notified = self.granted.notified();
            tokio::pin!(notified);
            // Register before re-checking so a grant between the check and
            // the await cannot be missed.
            notified.as_mut().enable();
            {
                let inner = self.inner.lock().expect("handoff lock poisoned");
                if inner.owner == me {
                    return inner.frame.clone();
                }
            }
            notified.await;
        }
    }

    /// Lend the token to the pending requester and park until it comes
    /// back. Returns the frame the other producer last sent, which becomes
    /// the seed for resuming.
    ///
    /// Call only after [`TransmitHandoff::yield_requested`] returned true.
    pub async fn lend(&self, me: LoopOwner, last: Option<AudioFrame>) -> Option<AudioFrame> {
        {
            let mut inner = self.inner.lock().expect("handoff lock poisoned");
            debug_assert_eq!(inner.owner, me);
            if let Some(next) = inner.pending.take() {
                inner.owner = next;
                inner.frame = last;
                self.granted.notify_waiters();
            } else {
                // Nothing pending after all; keep the token.
                return last;
            }
        }

        loop {
            let notified = self.returned.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let inner = self.inner.lock().expect("handoff lock poisoned");
                if inner.owner == me {
                    return inner.frame.clone();
                }
            }
            notified.await;
        }
    }

    /// Return the token to the other producer along with the final frame
    /// of this takeover.
    pub fn release(&self, me: LoopOwner, last: Option<AudioFrame>) {
        let mut inner = self.inner.lock().expect("handoff lock poisoned");
        if inner.owner != me {
            return;
        }
        inner.owner = match me {
            LoopOwner::Playlist => LoopOwner::Broadcast,
            LoopOwner::Broadcast => LoopOwner::Playlist,
        };
        if last.is_some() {
            inner.frame = last;
        }
        self.returned.notify_waiters();
        self.granted.notify_waiters();
    }
}
