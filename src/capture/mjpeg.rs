//! Raw MJPEG stream splitting
//!
//! Encoders such as `ffmpeg -f mjpeg` emit JPEG images back to back with no
//! container. Each image starts with the SOI marker `FF D8` and ends with the
//! EOI marker `FF D9`.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};
use crate::registry::Frame;

use super::source::{BoxedReader, FrameSource, Input};

/// JPEG start-of-image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// JPEG end-of-image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

const READ_CHUNK: usize = 64 * 1024;

fn find_marker(haystack: &[u8], marker: [u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == marker)
}

/// Incremental splitter for concatenated JPEG images
///
/// Bytes before the first SOI are discarded. The EOI search resumes where the
/// previous one stopped, so a large image arriving in many reads is scanned
/// once.
#[derive(Debug)]
pub struct MjpegSplitter {
    buf: BytesMut,
    /// Offset from which to resume the EOI search
    scanned: usize,
    max_frame_size: usize,
}

impl MjpegSplitter {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(READ_CHUNK),
            scanned: 0,
            max_frame_size,
        }
    }

    /// Append raw bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Buffer to read into directly
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        self.buf.reserve(READ_CHUNK);
        &mut self.buf
    }

    /// Bytes held that do not yet form a complete image
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Extract the next complete image, if one is buffered
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.scanned == 0 {
            match find_marker(&self.buf, SOI) {
                Some(start) => self.buf.advance(start),
                None => {
                    // Keep a trailing 0xFF, it may be the first half of SOI
                    let keep = usize::from(self.buf.last() == Some(&0xFF));
                    let discard = self.buf.len() - keep;
                    self.buf.advance(discard);
                    return Ok(None);
                }
            }
            self.scanned = SOI.len();
        }

        // Step back one byte so a marker split across reads is still found
        let from = self.scanned.saturating_sub(1).max(SOI.len());
        if let Some(pos) = find_marker(&self.buf[from..], EOI) {
            let end = from + pos + EOI.len();
            self.scanned = 0;
            let image = self.buf.split_to(end).freeze();
            return Ok(Some(Frame::new(image)));
        }

        if self.buf.len() > self.max_frame_size {
            let size = self.buf.len();
            self.buf.clear();
            self.scanned = 0;
            return Err(Error::InvalidFrame(format!(
                "no end-of-image marker within {} bytes (limit {})",
                size, self.max_frame_size
            )));
        }

        self.scanned = self.buf.len();
        Ok(None)
    }
}

/// Frame source over a raw MJPEG byte stream
pub struct MjpegSource {
    input: Option<Input>,
    reader: Option<BoxedReader>,
    splitter: MjpegSplitter,
}

impl MjpegSource {
    /// Source that opens `input` on `open`
    pub fn new(input: Input, max_frame_size: usize) -> Self {
        Self {
            input: Some(input),
            reader: None,
            splitter: MjpegSplitter::new(max_frame_size),
        }
    }

    /// Source over an already open reader
    pub fn from_reader<R>(reader: R, max_frame_size: usize) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            input: None,
            reader: Some(Box::new(reader)),
            splitter: MjpegSplitter::new(max_frame_size),
        }
    }
}

impl FrameSource for MjpegSource {
    async fn open(&mut self) -> Result<()> {
        if self.reader.is_none() {
            let input = self
                .input
                .as_ref()
                .ok_or_else(|| Error::SourceUnavailable("no input configured".into()))?;
            self.reader = Some(input.open().await?);
        }
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| Error::SourceUnavailable("source not opened".into()))?;

        loop {
            if let Some(frame) = self.splitter.next_frame()? {
                return Ok(Some(frame));
            }

            let n = reader.read_buf(self.splitter.buffer_mut()).await?;
            if n == 0 {
                if self.splitter.pending() > 0 {
                    tracing::debug!(
                        bytes = self.splitter.pending(),
                        "Discarding incomplete image at end of stream"
                    );
                }
                return Ok(None);
            }
        }
    }
}
