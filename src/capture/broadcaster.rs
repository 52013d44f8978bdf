//! Capture loop and subscriber fan-out
//!
//! The broadcaster pulls frames from one source on a dedicated task and
//! offers each to every registered subscriber. It never waits on a
//! subscriber: delivery is `try_send` into each bounded queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

use crate::error::{Error, Result};
use crate::registry::{RegistryConfig, SubscriberId, SubscriberRegistry, Subscription};
use crate::stats::{CaptureSnapshot, CaptureStats};

use super::config::MAX_FPS;
use super::source::FrameSource;

/// Owner of the capture loop for one frame source
pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
    stats: Arc<CaptureStats>,
    max_fps: Option<u32>,
    started: AtomicBool,
}

impl Broadcaster {
    /// Create a broadcaster delivering into `registry`
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self {
            registry,
            stats: Arc::new(CaptureStats::new()),
            max_fps: None,
            started: AtomicBool::new(false),
        }
    }

    /// Create a broadcaster with its own registry
    pub fn with_config(config: RegistryConfig) -> Self {
        Self::new(Arc::new(SubscriberRegistry::with_config(config)))
    }

    /// Limit how often the source is polled (capped at `MAX_FPS`)
    pub fn max_fps(mut self, fps: Option<u32>) -> Self {
        self.max_fps = fps.filter(|fps| *fps > 0).map(|fps| fps.min(MAX_FPS));
        self
    }

    /// Get a reference to the subscriber registry
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Register a new subscriber
    pub fn register(&self) -> Subscription {
        self.registry.register()
    }

    /// Remove a subscriber; no-op if already gone
    pub fn unregister(&self, id: SubscriberId) -> bool {
        self.registry.unregister(id)
    }

    /// Capture counters so far
    pub fn stats(&self) -> CaptureSnapshot {
        self.stats.snapshot()
    }

    /// Open the source and spawn the capture loop
    ///
    /// Fails with `SourceUnavailable` if the source cannot be opened, or
    /// `AlreadyStarted` on a second call. The returned handle completes when
    /// the source is exhausted or fails; by then every subscriber has been
    /// told the stream ended.
    pub async fn start<S: FrameSource>(&self, mut source: S) -> Result<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }

        if let Err(e) = source.open().await {
            self.started.store(false, Ordering::SeqCst);
            return Err(match e {
                Error::SourceUnavailable(_) => e,
                other => Error::SourceUnavailable(other.to_string()),
            });
        }

        tracing::info!(max_fps = ?self.max_fps, "Capture started");

        let registry = Arc::clone(&self.registry);
        let stats = Arc::clone(&self.stats);
        let pacer = self.max_fps.map(pacer);

        Ok(tokio::spawn(capture_loop(source, registry, stats, pacer)))
    }
}

fn pacer(fps: u32) -> Interval {
    let mut interval = tokio::time::interval(Duration::from_secs(1) / fps);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn capture_loop<S: FrameSource>(
    mut source: S,
    registry: Arc<SubscriberRegistry>,
    stats: Arc<CaptureStats>,
    mut pacer: Option<Interval>,
) {
    loop {
        if let Some(ref mut pacer) = pacer {
            pacer.tick().await;
        }

        match source.next_frame().await {
            Ok(Some(frame)) => {
                let outcome = registry.broadcast(&frame);
                stats.record(frame.len(), outcome);

                tracing::trace!(
                    bytes = frame.len(),
                    delivered = outcome.delivered,
                    dropped = outcome.dropped,
                    "Frame broadcast"
                );
            }
            Ok(None) => {
                tracing::info!("Frame source reached end of stream");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "Frame source failed");
                break;
            }
        }
    }

    let live = registry.finish();
    let totals = stats.snapshot();
    tracing::info!(
        frames = totals.frames_captured,
        drops = totals.drops,
        subscribers = live,
        "Capture loop ended"
    );
}
