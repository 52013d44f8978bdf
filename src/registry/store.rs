//! Subscriber registry implementation
//!
//! The single shared structure between the capture loop and the serving
//! connections. Registration, unregistration and the broadcast snapshot are
//! the only critical sections and none of them hold the lock across I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use super::config::RegistryConfig;
use super::entry::{BroadcastOutcome, Delivery, SubscriberEntry};
use super::frame::{Frame, SubscriberId};
use super::subscription::Subscription;

struct Inner {
    subscribers: HashMap<SubscriberId, SubscriberEntry>,
    /// Set once the capture loop has ended; no endpoint is registered after this
    finished: bool,
}

/// Registry of live subscribers
///
/// Shared via `Arc` between the broadcaster and every connection. A
/// `std::sync::Mutex` is used rather than an async lock because
/// unregistration runs from `Drop` and no critical section awaits.
pub struct SubscriberRegistry {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
    config: RegistryConfig,
}

impl SubscriberRegistry {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    ///
    /// The queue capacity is clamped even when the config was built by hand.
    pub fn with_config(config: RegistryConfig) -> Self {
        let config = RegistryConfig::default().queue_capacity(config.queue_capacity);
        Self {
            inner: Mutex::new(Inner {
                subscribers: HashMap::new(),
                finished: false,
            }),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // The map stays consistent even if a holder panicked: every mutation is
    // a single insert or remove.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new subscriber
    ///
    /// The returned subscription starts receiving from the next broadcast.
    /// Registering after the capture loop has ended yields a subscription
    /// whose first pull reports end-of-stream.
    pub fn register(self: &Arc<Self>) -> Subscription {
        let id = SubscriberId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        let dropped = Arc::new(AtomicU64::new(0));

        let mut inner = self.lock();
        if inner.finished {
            drop(inner);
            drop(tx);
            tracing::debug!(subscriber = %id, "Subscriber added after end of stream");
        } else {
            let entry = SubscriberEntry::new(id, tx, Arc::clone(&dropped));
            inner.subscribers.insert(id, entry);
            let count = inner.subscribers.len();
            drop(inner);

            tracing::info!(subscriber = %id, subscribers = count, "Subscriber added");
        }

        Subscription::new(id, rx, dropped, Arc::clone(self))
    }

    /// Remove a subscriber
    ///
    /// Returns `false` if the id was not registered; this is not an error so
    /// cleanup paths may call it unconditionally.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let mut inner = self.lock();
        let removed = inner.subscribers.remove(&id).is_some();
        let count = inner.subscribers.len();
        drop(inner);

        if removed {
            tracing::debug!(subscriber = %id, subscribers = count, "Subscriber removed");
        }
        removed
    }

    /// Offer a frame to every registered subscriber
    ///
    /// Works on a snapshot taken under the lock, so concurrent registration
    /// never observes a partial broadcast. A full queue drops the frame for
    /// that subscriber only and delivery continues with the others.
    pub fn broadcast(&self, frame: &Frame) -> BroadcastOutcome {
        let snapshot: Vec<SubscriberEntry> = {
            let inner = self.lock();
            if inner.finished {
                return BroadcastOutcome::default();
            }
            inner.subscribers.values().cloned().collect()
        };

        let mut outcome = BroadcastOutcome::default();
        for entry in &snapshot {
            let delivery = entry.offer(frame.clone());
            if delivery == Delivery::Saturated {
                tracing::trace!(subscriber = %entry.id, "Subscriber saturated, frame dropped");
            }
            outcome.record(delivery);
        }
        outcome
    }

    /// Mark the stream as ended
    ///
    /// Every registered endpoint is released, so each live subscription
    /// drains what it has queued and then observes end-of-stream. Returns the
    /// number of subscribers that were live.
    pub fn finish(&self) -> usize {
        let mut inner = self.lock();
        inner.finished = true;
        let released = std::mem::take(&mut inner.subscribers);
        drop(inner);

        released.len()
    }

    /// Whether `finish` has been called
    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    /// Whether the id is currently registered
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.lock().subscribers.contains_key(&id)
    }

    /// Number of registered subscribers
    pub fn len(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}
