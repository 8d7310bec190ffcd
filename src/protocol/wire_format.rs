//! Wire format encoding and decoding.
//!
//! Every frame starts with an 11-byte header:
//! ```text
//! ┌──────────┬───────┬──────────┬──────────┐
//! │ Method ID│ Flags │ Req ID   │ Length   │
//! │ 2 bytes  │ 1 byte│ 4 bytes  │ 4 bytes  │
//! │ uint16 BE│       │ uint32 BE│ uint32 BE│
//! └──────────┴───────┴──────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian. Requests carry flags `0x00`; the
//! node answers with [`flags::RESPONSE`], [`flags::STREAM_CHUNK`] or
//! [`flags::FAULT`] frames under the same method and request ID.

use bytes::{Buf, BufMut};

use crate::error::{Result, RpcError};

/// Header size in bytes (fixed, exactly 11).
pub const HEADER_SIZE: usize = 11;

/// Default maximum payload size (64 MB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Reserved method ID for the abort signal.
pub const ABORT_METHOD_ID: u16 = 0xFFFF;

/// Reserved method ID (never assigned).
pub const RESERVED_METHOD_ID: u16 = 0;

/// Flag constants for the protocol.
pub mod flags {
    /// Message type: response (1) or request (0).
    pub const IS_RESPONSE: u8 = 0b0000_0001;
    /// Fault flag: the call failed at the transport level.
    pub const IS_FAULT: u8 = 0b0000_0010;
    /// Stream flag: intermediate chunk ahead of the final response.
    pub const IS_STREAM: u8 = 0b0000_0100;

    /// Reserved bits mask (bits 3-7).
    pub const RESERVED_MASK: u8 = 0b1111_1000;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }

    /// Request flags = 0x00
    pub const REQUEST: u8 = 0;
    /// Final response carrying the result envelope = 0x01
    pub const RESPONSE: u8 = IS_RESPONSE;
    /// System fault frame = 0x03
    pub const FAULT: u8 = IS_RESPONSE | IS_FAULT;
    /// Stream chunk = 0x05
    pub const STREAM_CHUNK: u8 = IS_RESPONSE | IS_STREAM;
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Method identifier (1-65534, 0 reserved, 0xFFFF = abort).
    pub method_id: u16,
    /// Flags byte (see `flags` module).
    pub flags: u8,
    /// Request identifier, unique per in-flight call on a connection.
    pub request_id: u32,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(method_id: u16, flags: u8, request_id: u32, payload_length: u32) -> Self {
        Self {
            method_id,
            flags,
            request_id,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use nodewire::protocol::{Header, flags};
    ///
    /// let header = Header::new(1, flags::RESPONSE, 42, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 11);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode into the first `HEADER_SIZE` bytes of `buf`.
    ///
    /// Panics if `buf` is shorter than that.
    pub fn encode_into(&self, buf: &mut [u8]) {
        let mut out = &mut buf[..HEADER_SIZE];
        out.put_u16(self.method_id);
        out.put_u8(self.flags);
        out.put_u32(self.request_id);
        out.put_u32(self.payload_length);
    }

    /// Decode the header at the start of `buf`, or `None` if fewer than
    /// `HEADER_SIZE` bytes are available.
    ///
    /// ```
    /// use nodewire::protocol::Header;
    ///
    /// let bytes = [0, 1, 0x00, 0, 0, 0, 42, 0, 0, 0, 100];
    /// let header = Header::decode(&bytes).unwrap();
    /// assert_eq!(header.method_id, 1);
    /// assert_eq!(header.request_id, 42);
    /// assert_eq!(header.payload_length, 100);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let mut bytes = buf.get(..HEADER_SIZE)?;
        Some(Self {
            method_id: bytes.get_u16(),
            flags: bytes.get_u8(),
            request_id: bytes.get_u32(),
            payload_length: bytes.get_u32(),
        })
    }

    /// Reject request headers the node must not dispatch: method ID 0, an
    /// oversized payload, or any reserved flag bit set.
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.method_id == RESERVED_METHOD_ID {
            return Err(RpcError::Protocol("Method ID 0 is reserved".to_string()));
        }

        if self.payload_length > max_payload_size {
            return Err(RpcError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }

        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(RpcError::Protocol(
                "Reserved flag bits must be 0".to_string(),
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn is_abort(&self) -> bool {
        self.method_id == ABORT_METHOD_ID
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_RESPONSE)
    }

    #[inline]
    pub fn is_fault(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_FAULT)
    }

    #[inline]
    pub fn is_stream(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_STREAM)
    }
}
