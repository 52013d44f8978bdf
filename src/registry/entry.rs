//! Registry entry types
//!
//! The registry side of a subscription: the sending half of its queue and a
//! drop counter shared with the owning `Subscription`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::frame::{Frame, SubscriberId};

/// Result of offering one frame to one subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Frame queued
    Delivered,
    /// Queue full, frame dropped for this subscriber
    Saturated,
    /// Receiving side already gone
    Closed,
}

/// Entry for a single subscriber in the registry
#[derive(Debug, Clone)]
pub(super) struct SubscriberEntry {
    pub(super) id: SubscriberId,
    tx: mpsc::Sender<Frame>,
    dropped: Arc<AtomicU64>,
}

impl SubscriberEntry {
    pub(super) fn new(id: SubscriberId, tx: mpsc::Sender<Frame>, dropped: Arc<AtomicU64>) -> Self {
        Self { id, tx, dropped }
    }

    /// Offer a frame without waiting
    pub(super) fn offer(&self, frame: Frame) -> Delivery {
        match self.tx.try_send(frame) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Delivery::Saturated
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

/// Outcome of broadcasting one frame to a registry snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Subscribers the frame was queued for
    pub delivered: usize,
    /// Subscribers whose queue was full
    pub dropped: usize,
}

impl BroadcastOutcome {
    pub(super) fn record(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Delivered => self.delivered += 1,
            Delivery::Saturated => self.dropped += 1,
            Delivery::Closed => {}
        }
    }
}
