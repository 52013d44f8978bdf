//! HTTP multipart/x-mixed-replace framing
//!
//! The response is a never-ending multipart body; each part replaces the
//! previous image in the viewer.
//!
//! ```text
//! --jpeg_frame\r\n
//! Content-Type: image/jpeg\r\n
//! Content-Length: <n>\r\n
//! \r\n
//! <n bytes of JPEG>
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// Multipart boundary token
pub const BOUNDARY: &str = "jpeg_frame";

/// Content type of the stream response
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=jpeg_frame";

/// Content type of each part
pub const PART_CONTENT_TYPE: &str = "image/jpeg";

const SERVER_NAME: &str = concat!("mjpeg-rs/", env!("CARGO_PKG_VERSION"));

/// Non-streaming responses the server can send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    BadRequest,
    NotFound,
    MethodNotAllowed,
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::MethodNotAllowed => "Method Not Allowed",
        }
    }
}

/// Status line and headers that open the stream
pub fn response_header() -> Bytes {
    let header = format!(
        "HTTP/1.0 200 OK\r\n\
         Server: {}\r\n\
         Content-Type: {}\r\n\
         Cache-Control: no-cache, no-store, must-revalidate\r\n\
         Pragma: no-cache\r\n\
         Connection: close\r\n\
         \r\n",
        SERVER_NAME, STREAM_CONTENT_TYPE
    );
    Bytes::from(header)
}

/// Headers preceding one frame of `len` bytes
pub fn part_header(len: usize) -> Bytes {
    let mut buf = BytesMut::with_capacity(80);
    buf.put_slice(b"--");
    buf.put_slice(BOUNDARY.as_bytes());
    buf.put_slice(b"\r\nContent-Type: ");
    buf.put_slice(PART_CONTENT_TYPE.as_bytes());
    buf.put_slice(b"\r\nContent-Length: ");
    buf.put_slice(len.to_string().as_bytes());
    buf.put_slice(b"\r\n\r\n");
    buf.freeze()
}

/// Complete response for a request that will not be streamed
pub fn status_response(status: Status) -> Bytes {
    let body = format!("{} {}\n", status.code(), status.reason());
    let mut response = format!(
        "HTTP/1.0 {} {}\r\nServer: {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n",
        status.code(),
        status.reason(),
        SERVER_NAME,
        body.len()
    );
    if status == Status::MethodNotAllowed {
        response.push_str("Allow: GET\r\n");
    }
    response.push_str("\r\n");
    response.push_str(&body);
    Bytes::from(response)
}
