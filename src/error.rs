//! Error types
//!
//! A single crate-wide error enum. Errors that are part of normal operation
//! (a saturated subscriber queue, a double close) are not represented here;
//! they are handled where they happen.

use std::time::Duration;

/// Crate result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for capture, registry and server operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying I/O failure (socket, pipe, file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The frame source could not be opened
    #[error("frame source unavailable: {0}")]
    SourceUnavailable(String),

    /// `Broadcaster::start` was called a second time
    #[error("capture loop already started")]
    AlreadyStarted,

    /// A session tried to subscribe while it already held a subscription
    #[error("session {session_id} is already streaming")]
    ReentrancyViolation { session_id: u64 },

    /// A frame read from a source violates the framing rules
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// A client sent a request head we cannot parse
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An operation did not finish in time
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The worker pool stopped handing out slots
    #[error("worker pool closed")]
    PoolClosed,

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error means the peer went away rather than something
    /// being wrong on our side.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            Error::Timeout(_) => true,
            _ => false,
        }
    }
}
