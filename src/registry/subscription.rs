//! Subscription handle
//!
//! The consumer side of one registration. It is owned by whatever serves the
//! client; dropping it unregisters from the registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::frame::{Frame, SubscriberId};
use super::store::SubscriberRegistry;

/// A registered consumer of the frame stream
///
/// Frames arrive in capture order. Frames broadcast while the queue was full
/// are lost; `dropped_frames` counts them.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Frame>,
    dropped: Arc<AtomicU64>,
    registry: Arc<SubscriberRegistry>,
    closed: bool,
}

impl Subscription {
    pub(super) fn new(
        id: SubscriberId,
        rx: mpsc::Receiver<Frame>,
        dropped: Arc<AtomicU64>,
        registry: Arc<SubscriberRegistry>,
    ) -> Self {
        Self {
            id,
            rx,
            dropped,
            registry,
            closed: false,
        }
    }

    /// Subscriber id in the registry
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next frame
    ///
    /// Returns `None` once the stream has ended and every queued frame has
    /// been pulled, or after `close`. Cancel safe: if the future is dropped
    /// before completing, no frame is lost.
    pub async fn pull(&mut self) -> Option<Frame> {
        if self.closed {
            return None;
        }
        self.rx.recv().await
    }

    /// Number of frames dropped because this subscriber's queue was full
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the queue and unregister
    ///
    /// Idempotent: only the first call unregisters.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.rx.close();
        self.registry.unregister(self.id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .field("dropped", &self.dropped_frames())
            .finish()
    }
}
