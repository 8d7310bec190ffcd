//! Codec module - serialization of envelopes and stream chunks.
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde`, structs as maps
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! so the codec is fixed at compile time for every envelope type.

mod msgpack;

pub use msgpack::MsgPackCodec;
