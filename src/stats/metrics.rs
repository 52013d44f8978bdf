//! Statistics for capture and viewer sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::registry::BroadcastOutcome;

/// Per-viewer session statistics
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// Frames written to the client
    pub frames_sent: u64,
    /// Bytes written, headers included
    pub bytes_sent: u64,
    /// Frames lost to a full queue
    pub dropped_frames: u64,
    /// When the session started
    pub started_at: Instant,
}

impl SessionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self {
            frames_sent: 0,
            bytes_sent: 0,
            dropped_frames: 0,
            started_at: Instant::now(),
        }
    }

    /// Account for one frame part written to the client
    pub fn record_frame(&mut self, wire_bytes: usize) {
        self.frames_sent += 1;
        self.bytes_sent += wire_bytes as u64;
    }

    /// Get duration since the session started
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Frames per second actually delivered to this viewer
    pub fn framerate(&self) -> f64 {
        let secs = self.duration().as_secs_f64();
        if secs > 0.0 {
            self.frames_sent as f64 / secs
        } else {
            0.0
        }
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Capture-side counters, updated by the capture loop
#[derive(Debug, Default)]
pub struct CaptureStats {
    frames_captured: AtomicU64,
    bytes_captured: AtomicU64,
    deliveries: AtomicU64,
    drops: AtomicU64,
}

/// Point-in-time copy of `CaptureStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureSnapshot {
    pub frames_captured: u64,
    pub bytes_captured: u64,
    pub deliveries: u64,
    pub drops: u64,
}

impl CaptureStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one captured frame and its broadcast outcome
    pub fn record(&self, frame_len: usize, outcome: BroadcastOutcome) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
        self.bytes_captured
            .fetch_add(frame_len as u64, Ordering::Relaxed);
        self.deliveries
            .fetch_add(outcome.delivered as u64, Ordering::Relaxed);
        self.drops.fetch_add(outcome.dropped as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            bytes_captured: self.bytes_captured.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
        }
    }
}
