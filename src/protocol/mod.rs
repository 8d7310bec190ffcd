//! Protocol module - wire format, framing, and envelope I/O.
//!
//! - 11-byte header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - [`BinaryProtocol`] for reading and writing the envelopes inside a frame

mod binary;
mod frame;
mod frame_buffer;
mod wire_format;

pub use binary::BinaryProtocol;
pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    flags, Header, ABORT_METHOD_ID, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE, RESERVED_METHOD_ID,
};
