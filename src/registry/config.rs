//! Registry configuration

/// Default number of frames a subscriber may have queued
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

/// Largest accepted queue capacity
pub const MAX_QUEUE_CAPACITY: usize = 64;

/// Configuration for the subscriber registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Frames buffered per subscriber before new frames are dropped for it
    pub queue_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl RegistryConfig {
    /// Set the per-subscriber queue capacity (clamped to `1..=64`)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.clamp(1, MAX_QUEUE_CAPACITY);
        self
    }
}
