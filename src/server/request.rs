//! Minimal HTTP request head parsing
//!
//! Only the request line and headers are read. The server serves a single
//! resource and never reads a request body.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

/// Path that serves the stream
pub const STREAM_PATH: &str = "/";

/// Parsed request line and headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    /// Request target as sent, including any query string
    pub target: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
}

/// What to do with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Stream,
    NotFound,
    MethodNotAllowed,
}

impl Request {
    /// Parse a request head (without the terminating blank line)
    pub fn parse(head: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(head)
            .map_err(|_| Error::InvalidRequest("request head is not UTF-8".into()))?;
        let mut lines = text.split('\n').map(|line| line.trim_end_matches('\r'));

        let request_line = lines
            .next()
            .filter(|line| !line.is_empty())
            .ok_or_else(|| Error::InvalidRequest("empty request".into()))?;

        let mut parts = request_line.split_whitespace();
        let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(t), Some(v), None) if v.starts_with("HTTP/") => (m, t, v),
            _ => {
                return Err(Error::InvalidRequest(format!(
                    "malformed request line '{}'",
                    request_line
                )))
            }
        };

        let mut headers = Vec::new();
        for line in lines.filter(|line| !line.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| Error::InvalidRequest(format!("malformed header '{}'", line)))?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        Ok(Self {
            method: method.to_string(),
            target: target.to_string(),
            version: version.to_string(),
            headers,
        })
    }

    /// Target without query string or fragment
    pub fn path(&self) -> &str {
        let end = self
            .target
            .find(|c| c == '?' || c == '#')
            .unwrap_or(self.target.len());
        &self.target[..end]
    }

    /// First header with the given name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Decide how to answer this request
    pub fn route(&self) -> Route {
        if self.path() != STREAM_PATH {
            Route::NotFound
        } else if self.method != "GET" {
            Route::MethodNotAllowed
        } else {
            Route::Stream
        }
    }
}

fn head_end(buf: &[u8]) -> Option<usize> {
    let blank = buf.windows(2).enumerate().find_map(|(i, window)| {
        if window == b"\n\n" || (window == b"\n\r" && buf.get(i + 2) == Some(&b'\n')) {
            Some(i)
        } else {
            None
        }
    })?;

    // Exclude the line terminator of the last header line
    Some(if blank > 0 && buf[blank - 1] == b'\r' {
        blank - 1
    } else {
        blank
    })
}

/// Read bytes up to the blank line ending the request head
///
/// Returns `Ok(None)` if the peer closed before sending anything. Bytes after
/// the head are discarded.
pub async fn read_request_head<R>(reader: &mut R, max_size: usize) -> Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);
    loop {
        if let Some(end) = head_end(&buf) {
            buf.truncate(end);
            return Ok(Some(buf.freeze()));
        }
        if buf.len() > max_size {
            return Err(Error::InvalidRequest(format!(
                "request head exceeds {} bytes",
                max_size
            )));
        }

        buf.reserve(1024);
        if reader.read_buf(&mut buf).await? == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(Error::InvalidRequest("connection closed mid-request".into()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request() {
        let request = Request::parse(
            b"GET /?t=1 HTTP/1.1\r\nHost: cam.local:9000\r\nUser-Agent: curl/8.0\r\n",
        )
        .unwrap();

        assert_eq!(request.method, "GET");
        assert_eq!(request.target, "/?t=1");
        assert_eq!(request.path(), "/");
        assert_eq!(request.version, "HTTP/1.1");
        assert_eq!(request.header("host"), Some("cam.local:9000"));
        assert_eq!(request.header("USER-AGENT"), Some("curl/8.0"));
        assert_eq!(request.route(), Route::Stream);
    }

    #[test]
    fn test_routes() {
        let other = Request::parse(b"GET /favicon.ico HTTP/1.1").unwrap();
        assert_eq!(other.route(), Route::NotFound);

        let post = Request::parse(b"POST / HTTP/1.1").unwrap();
        assert_eq!(post.route(), Route::MethodNotAllowed);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(Request::parse(b""), Err(Error::InvalidRequest(_))));
        assert!(matches!(Request::parse(b"GET /"), Err(Error::InvalidRequest(_))));
        assert!(matches!(
            Request::parse(b"GET / HTTP/1.1\r\nno-colon\r\n"),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            Request::parse(b"\xFF\xFE / HTTP/1.1"),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_read_head_crlf() {
        let mut reader = tokio_test::io::Builder::new()
            .read(b"GET / HTTP/1.1\r\nHo")
            .read(b"st: x\r\n\r\nignored body")
            .build();

        let head = read_request_head(&mut reader, 1024).await.unwrap().unwrap();
        assert_eq!(&head[..], b"GET / HTTP/1.1\r\nHost: x");
        let request = Request::parse(&head).unwrap();
        assert_eq!(request.header("Host"), Some("x"));
    }

    #[tokio::test]
    async fn test_read_head_bare_lf() {
        let mut reader = &b"GET / HTTP/1.0\n\n"[..];
        let head = read_request_head(&mut reader, 1024).await.unwrap().unwrap();
        assert_eq!(&head[..], b"GET / HTTP/1.0");
    }

    #[tokio::test]
    async fn test_read_head_closed_early() {
        let mut empty = &b""[..];
        assert!(read_request_head(&mut empty, 1024).await.unwrap().is_none());

        let mut partial = &b"GET / HTTP/1.1\r\n"[..];
        assert!(matches!(
            read_request_head(&mut partial, 1024).await,
            Err(Error::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_read_head_too_large() {
        let big = vec![b'a'; 4096];
        let mut reader = &big[..];
        assert!(matches!(
            read_request_head(&mut reader, 100).await,
            Err(Error::InvalidRequest(_))
        ));
    }
}
