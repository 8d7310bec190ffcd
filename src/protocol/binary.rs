//! Envelope reader/writer over a single frame payload.
//!
//! A request payload is a sequence of MsgPack envelopes (the call headers,
//! then the method arguments). [`BinaryProtocol`] reads them one at a time
//! from the inbound payload and accumulates the reply envelope in an
//! outbound buffer that the server turns into a response frame.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::MsgPackCodec;
use crate::error::{Result, RpcError};

/// Reader/writer pair for the envelopes of one call.
#[derive(Debug, Default)]
pub struct BinaryProtocol {
    input: Bytes,
    output: BytesMut,
}

impl BinaryProtocol {
    /// Create a protocol reading from `input` with an empty output buffer.
    pub fn new(input: Bytes) -> Self {
        Self {
            input,
            output: BytesMut::new(),
        }
    }

    /// Read the next envelope from the inbound payload.
    pub fn read<T: DeserializeOwned>(&mut self) -> Result<T> {
        MsgPackCodec::decode_from((&mut self.input).reader())
    }

    /// Fail if unread bytes remain after the last expected envelope.
    pub fn finish_read(&self) -> Result<()> {
        if self.input.has_remaining() {
            return Err(RpcError::Protocol(format!(
                "{} trailing bytes after request envelope",
                self.input.remaining()
            )));
        }
        Ok(())
    }

    /// Append an envelope to the outbound buffer.
    pub fn write<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        MsgPackCodec::encode_into(&mut (&mut self.output).writer(), value)
    }

    /// Number of inbound bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.input.remaining()
    }

    /// Take everything written so far, leaving the output buffer empty.
    pub fn take_output(&mut self) -> Bytes {
        self.output.split().freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Sample {
        name: String,
        step: u64,
    }

    fn payload_of(values: &[&Sample]) -> Bytes {
        let mut buf = Vec::new();
        for value in values {
            MsgPackCodec::encode_into(&mut buf, *value).unwrap();
        }
        Bytes::from(buf)
    }

    #[test]
    fn test_reads_envelopes_in_order() {
        let a = Sample {
            name: "a".into(),
            step: 1,
        };
        let b = Sample {
            name: "b".into(),
            step: 2,
        };
        let mut protocol = BinaryProtocol::new(payload_of(&[&a, &b]));

        assert_eq!(protocol.read::<Sample>().unwrap(), a);
        assert!(protocol.finish_read().is_err());
        assert_eq!(protocol.read::<Sample>().unwrap(), b);
        assert!(protocol.finish_read().is_ok());
        assert_eq!(protocol.remaining(), 0);
    }

    #[test]
    fn test_read_past_end_fails() {
        let mut protocol = BinaryProtocol::new(Bytes::new());
        assert!(protocol.read::<Sample>().is_err());
    }

    #[test]
    fn test_write_then_take_output() {
        let sample = Sample {
            name: "x".into(),
            step: 30,
        };
        let mut protocol = BinaryProtocol::default();

        protocol.write(&sample).unwrap();
        let out = protocol.take_output();

        assert_eq!(out.as_ref(), MsgPackCodec::encode(&sample).unwrap().as_slice());
        assert!(protocol.take_output().is_empty());
    }

    #[test]
    fn test_read_then_write_is_byte_identical() {
        let sample = Sample {
            name: "series".into(),
            step: 15,
        };
        let input = payload_of(&[&sample]);
        let mut protocol = BinaryProtocol::new(input.clone());

        let decoded: Sample = protocol.read().unwrap();
        protocol.write(&decoded).unwrap();

        assert_eq!(protocol.take_output(), input);
    }
}
