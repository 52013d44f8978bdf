//! Frame sources
//!
//! A frame source produces encoded images on demand. The capture loop only
//! knows this trait; where the bytes come from (a pipe, a file, a camera
//! behind an encoder process, an in-process channel) is up to the source.

use std::future::Future;
use std::path::PathBuf;

use tokio::io::AsyncRead;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::registry::Frame;

use super::command::CommandSource;
use super::framing::FramedSource;
use super::mjpeg::MjpegSource;

/// Boxed async reader used by stream-backed sources
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Producer of encoded frames
///
/// Implementations may use `async fn` for both methods.
pub trait FrameSource: Send + 'static {
    /// Acquire the underlying resource
    ///
    /// Failure here is reported as `Error::SourceUnavailable` by the
    /// broadcaster and is fatal at startup.
    fn open(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Produce the next frame
    ///
    /// `Ok(None)` means the source is exhausted and no more frames will come.
    fn next_frame(&mut self) -> impl Future<Output = Result<Option<Frame>>> + Send;
}

/// Byte stream a source reads from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Standard input of this process
    Stdin,
    /// A file or FIFO
    Path(PathBuf),
}

impl Input {
    /// Open the input for reading
    pub async fn open(&self) -> Result<BoxedReader> {
        match self {
            Input::Stdin => Ok(Box::new(tokio::io::stdin())),
            Input::Path(path) => match tokio::fs::File::open(path).await {
                Ok(file) => Ok(Box::new(file)),
                Err(e) => Err(Error::SourceUnavailable(format!(
                    "{}: {}",
                    path.display(),
                    e
                ))),
            },
        }
    }
}

impl std::fmt::Display for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Input::Stdin => write!(f, "stdin"),
            Input::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// In-process frame source fed through a channel
///
/// The stream ends once every sender has been dropped.
pub struct ChannelSource {
    rx: mpsc::Receiver<Frame>,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it
    pub fn new(capacity: usize) -> (mpsc::Sender<Frame>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }
}

impl FrameSource for ChannelSource {
    async fn open(&mut self) -> Result<()> {
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.rx.recv().await)
    }
}

/// Any of the built-in sources, as selected by a `SourceSpec`
pub enum AnySource {
    Framed(FramedSource),
    Mjpeg(MjpegSource),
    Command(CommandSource),
}

impl FrameSource for AnySource {
    async fn open(&mut self) -> Result<()> {
        match self {
            AnySource::Framed(source) => source.open().await,
            AnySource::Mjpeg(source) => source.open().await,
            AnySource::Command(source) => source.open().await,
        }
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self {
            AnySource::Framed(source) => source.next_frame().await,
            AnySource::Mjpeg(source) => source.next_frame().await,
            AnySource::Command(source) => source.next_frame().await,
        }
    }
}
