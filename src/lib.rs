//! Live MJPEG fan-out server
//!
//! One capture source, many HTTP viewers. A single capture loop pulls JPEG
//! frames from a source (camera through ffmpeg, a pipe, a file) and offers
//! each to every connected viewer. Viewers that fall behind lose frames;
//! they never slow down the capture loop or each other.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mjpeg_rs::{Broadcaster, CaptureConfig, ServerConfig, StreamServer};
//!
//! #[tokio::main]
//! async fn main() -> mjpeg_rs::Result<()> {
//!     let capture = CaptureConfig::with_source("-".parse()?);
//!     let broadcaster = Broadcaster::new(Default::default());
//!     broadcaster.start(capture.build_source()).await?;
//!
//!     let server = StreamServer::new(ServerConfig::default(), Arc::clone(broadcaster.registry()));
//!     server.run().await
//! }
//! ```

pub mod capture;
pub mod cli;
pub mod error;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use capture::{Broadcaster, CaptureConfig, FrameSource, SourceSpec};
pub use error::{Error, Result};
pub use registry::{Frame, RegistryConfig, SubscriberId, SubscriberRegistry, Subscription};
pub use server::{ServerConfig, StreamServer};
pub use session::{SessionPhase, SessionState};
pub use stats::{CaptureSnapshot, SessionStats};
