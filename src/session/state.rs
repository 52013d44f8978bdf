//! Session state machine
//!
//! Tracks one viewer connection from accept to close and owns its
//! subscription while streaming.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::registry::{SubscriberRegistry, Subscription};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// TCP connected, request not yet accepted for streaming
    Connected,
    /// Subscribed and sending frames
    Streaming,
    /// Subscription released
    Closed,
}

/// Complete session state
#[derive(Debug)]
pub struct SessionState {
    /// Unique session ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    phase: SessionPhase,

    /// Connection start time
    pub connected_at: Instant,

    /// Time streaming started
    pub streaming_since: Option<Instant>,

    /// Subscription held while streaming
    subscription: Option<Subscription>,
}

impl SessionState {
    /// Create a new session state
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            phase: SessionPhase::Connected,
            connected_at: Instant::now(),
            streaming_since: None,
            subscription: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Register with the registry and enter `Streaming`
    ///
    /// A session subscribes at most once. Calling this again, while
    /// streaming or after close, is a `ReentrancyViolation`.
    pub fn start_streaming(
        &mut self,
        registry: &Arc<SubscriberRegistry>,
    ) -> Result<&mut Subscription> {
        if self.phase != SessionPhase::Connected || self.subscription.is_some() {
            return Err(Error::ReentrancyViolation { session_id: self.id });
        }

        self.phase = SessionPhase::Streaming;
        self.streaming_since = Some(Instant::now());
        Ok(self.subscription.insert(registry.register()))
    }

    /// Release the subscription and enter `Closed`
    ///
    /// Safe to call any number of times from any phase. Returns the number of
    /// frames the subscription dropped, if one was held.
    pub fn close(&mut self) -> Option<u64> {
        self.phase = SessionPhase::Closed;
        self.subscription.take().map(|mut subscription| {
            let dropped = subscription.dropped_frames();
            subscription.close();
            dropped
        })
    }

    /// Check if session is streaming
    pub fn is_streaming(&self) -> bool {
        self.phase == SessionPhase::Streaming
    }

    /// Get session duration
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}
