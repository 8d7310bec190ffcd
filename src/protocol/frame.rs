//! Frame struct with typed accessors.
//!
//! A complete protocol frame: header plus payload, shared zero-copy through
//! `bytes::Bytes`.
//!
//! ```
//! use nodewire::protocol::{Frame, Header, flags};
//! use bytes::Bytes;
//!
//! let header = Header::new(1, flags::REQUEST, 42, 5);
//! let frame = Frame::new(header, Bytes::from_static(b"hello"));
//!
//! assert_eq!(frame.method_id(), 1);
//! assert_eq!(frame.payload(), b"hello");
//! ```

use bytes::Bytes;

use super::wire_format::{Header, HEADER_SIZE};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn method_id(&self) -> u16 {
        self.header.method_id
    }

    #[inline]
    pub fn flags(&self) -> u8 {
        self.header.flags
    }

    #[inline]
    pub fn request_id(&self) -> u32 {
        self.header.request_id
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        self.header.is_response()
    }

    #[inline]
    pub fn is_fault(&self) -> bool {
        self.header.is_fault()
    }

    #[inline]
    pub fn is_stream(&self) -> bool {
        self.header.is_stream()
    }

    #[inline]
    pub fn is_abort(&self) -> bool {
        self.header.is_abort()
    }
}

/// Build a complete frame as a single byte vector.
///
/// The header's `payload_length` is taken from `payload`, so callers only
/// choose method, flags and request ID.
///
/// ```
/// use nodewire::protocol::{build_frame, flags, HEADER_SIZE};
///
/// let bytes = build_frame(1, flags::REQUEST, 42, b"hello");
/// assert_eq!(bytes.len(), HEADER_SIZE + 5);
/// ```
pub fn build_frame(method_id: u16, frame_flags: u8, request_id: u32, payload: &[u8]) -> Vec<u8> {
    let header = Header::new(method_id, frame_flags, request_id, payload.len() as u32);
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}
