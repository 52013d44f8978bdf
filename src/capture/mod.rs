//! Frame capture
//!
//! Sources produce encoded frames; the broadcaster runs the capture loop
//! that feeds them into the subscriber registry.
//!
//! ```text
//!  ffmpeg / pipe / file ──► FrameSource::next_frame()
//!                                   │
//!                            Broadcaster (capture task)
//!                                   │
//!                      SubscriberRegistry::broadcast()
//! ```

pub mod broadcaster;
pub mod command;
pub mod config;
pub mod framing;
pub mod mjpeg;
pub mod source;

pub use broadcaster::Broadcaster;
pub use command::CommandSource;
pub use config::{CaptureConfig, SourceSpec};
pub use framing::{encode_frame, read_frame, FramedSource};
pub use mjpeg::{MjpegSource, MjpegSplitter};
pub use source::{AnySource, ChannelSource, FrameSource, Input};
