//! Length-prefixed frame transport
//!
//! When frames cross a process boundary (stdin, a FIFO) each one is written
//! as an 8-byte native-endian signed length followed by that many payload
//! bytes.
//!
//! ```text
//! +----------------+---------------------+
//! | len: i64 (ne)  | payload: len bytes  |
//! +----------------+---------------------+
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};
use crate::registry::Frame;

use super::source::{BoxedReader, FrameSource, Input};

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_SIZE: usize = 8;

/// Encode one payload with its length prefix
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_i64_ne(payload.len() as i64);
    buf.put_slice(payload);
    buf.freeze()
}

/// Read one length-prefixed payload
///
/// Returns `Ok(None)` when the reader is at end of stream on a frame
/// boundary. End of stream inside a frame, a negative length, or a length
/// above `max_frame_size` is an `InvalidFrame` error.
pub async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> Result<Option<Bytes>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_SIZE {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(Error::InvalidFrame(format!(
                "truncated length prefix ({} of {} bytes)",
                filled, LENGTH_PREFIX_SIZE
            )));
        }
        filled += n;
    }

    let len = i64::from_ne_bytes(prefix);
    if len < 0 {
        return Err(Error::InvalidFrame(format!("negative frame length {}", len)));
    }
    if len as u64 > max_frame_size as u64 {
        return Err(Error::InvalidFrame(format!(
            "frame length {} exceeds limit {}",
            len, max_frame_size
        )));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::InvalidFrame(format!("truncated payload, expected {} bytes", len))
        } else {
            Error::Io(e)
        }
    })?;

    Ok(Some(Bytes::from(payload)))
}

/// Frame source reading the length-prefixed transport
///
/// Typically fed by an external capture process through stdin or a FIFO.
pub struct FramedSource {
    input: Option<Input>,
    reader: Option<BoxedReader>,
    max_frame_size: usize,
}

impl FramedSource {
    /// Source that opens `input` on `open`
    pub fn new(input: Input, max_frame_size: usize) -> Self {
        Self {
            input: Some(input),
            reader: None,
            max_frame_size,
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
            max_frame_size,
        }
    }
}

impl FrameSource for FramedSource {
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

        let payload = read_frame(reader.as_mut(), self.max_frame_size).await?;
        Ok(payload.map(Frame::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 1024;

    #[test]
    fn test_encode_layout() {
        let encoded = encode_frame(b"jpeg");

        assert_eq!(encoded.len(), LENGTH_PREFIX_SIZE + 4);
        assert_eq!(&encoded[..8], &4i64.to_ne_bytes());
        assert_eq!(&encoded[8..], b"jpeg");
    }

    #[tokio::test]
    async fn test_read_sequence_then_eof() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&encode_frame(b"A"));
        wire.extend_from_slice(&encode_frame(b""));
        wire.extend_from_slice(&encode_frame(b"CCC"));
        let mut reader = &wire[..];

        assert_eq!(read_frame(&mut reader, MAX).await.unwrap().unwrap(), "A");
        assert_eq!(read_frame(&mut reader, MAX).await.unwrap().unwrap(), "");
        assert_eq!(read_frame(&mut reader, MAX).await.unwrap().unwrap(), "CCC");
        assert!(read_frame(&mut reader, MAX).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prefix_split_across_reads() {
        let encoded = encode_frame(b"split");
        let mut reader = tokio_test::io::Builder::new()
            .read(&encoded[..3])
            .read(&encoded[3..10])
            .read(&encoded[10..])
            .build();

        let payload = read_frame(&mut reader, MAX).await.unwrap().unwrap();
        assert_eq!(payload, "split");
    }

    #[tokio::test]
    async fn test_truncated_prefix() {
        let mut reader = &[1u8, 0, 0][..];
        let err = read_frame(&mut reader, MAX).await.unwrap_err();
        assert!(matches!(err, Error::InvalidFrame(_)));
    }

    #[tokio::test]
    async fn test_truncated_payload() {
        let encoded = encode_frame(b"abcdef");
        let mut reader = &encoded[..encoded.len() - 2];
        let err = read_frame(&mut reader, MAX).await.unwrap_err();
        assert!(matches!(err, Error::InvalidFrame(_)));
    }

    #[tokio::test]
    async fn test_negative_length() {
        let wire = (-5i64).to_ne_bytes();
        let mut reader = &wire[..];
        let err = read_frame(&mut reader, MAX).await.unwrap_err();
        assert!(matches!(err, Error::InvalidFrame(_)));
    }

    #[tokio::test]
    async fn test_oversize_length() {
        let wire = ((MAX as i64) + 1).to_ne_bytes();
        let mut reader = &wire[..];
        let err = read_frame(&mut reader, MAX).await.unwrap_err();
        assert!(matches!(err, Error::InvalidFrame(_)));
    }

    #[tokio::test]
    async fn test_framed_source() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&encode_frame(b"one"));
        wire.extend_from_slice(&encode_frame(b"two"));

        let mut source = FramedSource::from_reader(std::io::Cursor::new(wire), MAX);
        source.open().await.unwrap();

        assert_eq!(source.next_frame().await.unwrap(), Some(Frame::from(&b"one"[..])));
        assert_eq!(source.next_frame().await.unwrap(), Some(Frame::from(&b"two"[..])));
        assert_eq!(source.next_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_framed_source_missing_path() {
        let mut source = FramedSource::new(Input::Path("/nonexistent/mjpeg-rs/feed".into()), MAX);
        let err = source.open().await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
    }
}
