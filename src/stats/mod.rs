//! Capture and session statistics

pub mod metrics;

pub use metrics::{CaptureSnapshot, CaptureStats, SessionStats};
