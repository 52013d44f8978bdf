//! Frame and subscriber identifier types
//!
//! A frame is one encoded image. It carries no identity beyond its bytes and
//! is cheap to clone because `Bytes` is reference counted.

use bytes::Bytes;

/// Opaque identifier of one registration in the subscriber registry
///
/// Ids are allocated from a monotonically increasing counter and are never
/// reused for the lifetime of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub(super) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value, for logging
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// One encoded image to be broadcast to subscribers
///
/// All subscribers share the same allocation; delivering a frame only bumps
/// a reference count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
}

impl Frame {
    /// Wrap encoded image bytes
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Frame payload
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume the frame, returning the payload
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl From<Bytes> for Frame {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

impl From<&'static [u8]> for Frame {
    fn from(data: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_allocation() {
        let frame = Frame::new(vec![0xFF, 0xD8, 0xFF, 0xD9]);
        let copy = frame.clone();

        assert_eq!(frame, copy);
        assert_eq!(frame.data().as_ptr(), copy.data().as_ptr());
        assert_eq!(copy.len(), 4);
    }

    #[test]
    fn test_subscriber_id_display() {
        assert_eq!(SubscriberId::new(12).to_string(), "sub-12");
        assert_eq!(SubscriberId::new(12).as_u64(), 12);
    }
}
