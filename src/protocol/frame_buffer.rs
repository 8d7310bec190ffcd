//! Reassembly of frames from arbitrary read chunks.
//!
//! Bytes accumulate in a `BytesMut`; each extracted payload is a frozen slice
//! of it, so a frame never copies its payload. Once a header has been parsed
//! it is held in `pending` until its payload is complete.

use bytes::{Buf, BytesMut};

use super::wire_format::{Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use super::Frame;
use crate::error::{Result, RpcError};

const INITIAL_CAPACITY: usize = 64 * 1024;

/// Accumulates incoming bytes and yields complete frames.
pub struct FrameBuffer {
    buffer: BytesMut,
    pending: Option<Header>,
    max_payload_size: u32,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Frames announcing more than `max_payload_size` bytes are refused.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            pending: None,
            max_payload_size,
        }
    }

    /// Append `data` and drain every frame it completes.
    ///
    /// An oversized payload length is a protocol error. The stream cannot be
    /// resynchronized after one, so the connection should be dropped.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        loop {
            let header = match self.pending.take() {
                Some(header) => header,
                None => match self.next_header()? {
                    Some(header) => header,
                    None => break,
                },
            };

            let len = header.payload_length as usize;
            if self.buffer.len() < len {
                self.pending = Some(header);
                break;
            }
            let payload = self.buffer.split_to(len).freeze();
            frames.push(Frame::new(header, payload));
        }

        Ok(frames)
    }

    fn next_header(&mut self) -> Result<Option<Header>> {
        let Some(header) = Header::decode(&self.buffer) else {
            return Ok(None);
        };
        if header.payload_length > self.max_payload_size {
            return Err(RpcError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                header.payload_length, self.max_payload_size
            )));
        }
        self.buffer.advance(HEADER_SIZE);
        Ok(Some(header))
    }

    /// Buffered bytes not yet returned as frames, excluding a parsed header.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_none() && self.buffer.is_empty()
    }

    /// True when a header has been parsed and its payload is incomplete.
    pub fn awaiting_payload(&self) -> bool {
        self.pending.is_some()
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
