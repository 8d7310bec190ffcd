//! MsgPack codec using `rmp-serde`.
//!
//! Structs are always written as maps (`to_vec_named` / `write_named`), never
//! as positional arrays. Field names on the wire keep envelopes readable by
//! clients that do not share our struct layout, and make added optional
//! fields backwards compatible.
//!
//! # Example
//!
//! ```
//! use nodewire::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Datapoint {
//!     timestamp: i64,
//!     value: f64,
//! }
//!
//! let dp = Datapoint { timestamp: 42, value: 1.5 };
//! let encoded = MsgPackCodec::encode(&dp).unwrap();
//! let decoded: Datapoint = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, dp);
//! ```

use std::io::{Read, Write};

use crate::error::Result;

/// MessagePack codec for envelopes and stream chunks.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map).
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Encode a value onto the end of a writer (struct-as-map).
    #[inline]
    pub fn encode_into<W: Write + ?Sized, T: serde::Serialize + ?Sized>(
        writer: &mut W,
        value: &T,
    ) -> Result<()> {
        rmp_serde::encode::write_named(writer, value)?;
        Ok(())
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Decode exactly one value from a reader, leaving the rest unread.
    #[inline]
    pub fn decode_from<R: Read, T: serde::de::DeserializeOwned>(reader: R) -> Result<T> {
        Ok(rmp_serde::from_read(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Series {
        id: String,
        points: Vec<(i64, f64)>,
        limit: Option<u64>,
    }

    #[test]
    fn test_encode_decode_struct() {
        let original = Series {
            id: "cpu.user".to_string(),
            points: vec![(10, 0.5), (20, 0.75)],
            limit: Some(100),
        };

        let encoded = MsgPackCodec::encode(&original).unwrap();
        let decoded: Series = MsgPackCodec::decode(&encoded).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_structs_are_maps() {
        let series = Series {
            id: "x".to_string(),
            points: vec![],
            limit: None,
        };

        let encoded = MsgPackCodec::encode(&series).unwrap();

        // fixmap with 3 entries; a positional encoding would start with 0x93
        assert_eq!(encoded[0], 0x83, "Expected fixmap, got {:02X}", encoded[0]);
    }

    #[test]
    fn test_none_is_nil() {
        let val: Option<i32> = None;
        assert_eq!(MsgPackCodec::encode(&val).unwrap(), vec![0xc0]);
    }

    #[test]
    fn test_decode_from_consumes_one_value() {
        let mut buf = Vec::new();
        MsgPackCodec::encode_into(&mut buf, &"first").unwrap();
        MsgPackCodec::encode_into(&mut buf, &7u32).unwrap();

        let mut cursor = std::io::Cursor::new(buf.as_slice());
        let first: String = MsgPackCodec::decode_from(&mut cursor).unwrap();
        let second: u32 = MsgPackCodec::decode_from(&mut cursor).unwrap();

        assert_eq!(first, "first");
        assert_eq!(second, 7);
        assert_eq!(cursor.position() as usize, buf.len());
    }

    #[test]
    fn test_encode_into_matches_encode() {
        let mut baggage = BTreeMap::new();
        baggage.insert("tenant".to_string(), "a".to_string());

        let mut buf = Vec::new();
        MsgPackCodec::encode_into(&mut buf, &baggage).unwrap();
        assert_eq!(buf, MsgPackCodec::encode(&baggage).unwrap());
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let invalid = b"\xc1 is never valid msgpack";
        let result: Result<Series> = MsgPackCodec::decode(invalid);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_error_on_wrong_shape() {
        let encoded = MsgPackCodec::encode(&vec![1, 2, 3]).unwrap();
        let result: Result<Series> = MsgPackCodec::decode(&encoded);
        assert!(result.is_err());
    }
}
