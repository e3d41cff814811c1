//! Canonical binary encoding.
//!
//! Every persisted or hashed value goes through these functions so that equal
//! values always produce identical bytes. The format is bincode 1.x with its
//! default options: fixed-width little-endian integers and `u64` length
//! prefixes on sequences.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a value to its canonical bytes.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode a value from canonical bytes.
///
/// Trailing bytes are ignored by bincode, so callers that need strictness
/// compare [`encoded_len`] of the result against the input length.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

/// Length in bytes of the canonical encoding, without allocating it.
pub fn encoded_len<T: Serialize + ?Sized>(value: &T) -> CodecResult<u64> {
    bincode::serialized_size(value).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Errors from the canonical codec.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Convenience alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        value: u64,
        tag: u8,
        body: Vec<u8>,
    }

    #[test]
    fn integers_are_fixed_width_little_endian() {
        let bytes = encode(&0x0102_0304u32).unwrap();
        assert_eq!(bytes, vec![0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn sequences_carry_u64_length_prefix() {
        let bytes = encode(&vec![7u8, 8, 9]).unwrap();
        assert_eq!(bytes.len(), 8 + 3);
        assert_eq!(&bytes[..8], &3u64.to_le_bytes());
    }

    #[test]
    fn encoded_len_matches_encoding() {
        let sample = Sample {
            value: 42,
            tag: 1,
            body: vec![0; 17],
        };
        let bytes = encode(&sample).unwrap();
        assert_eq!(encoded_len(&sample).unwrap(), bytes.len() as u64);
        let parsed: Sample = decode(&bytes).unwrap();
        assert_eq!(parsed, sample);
    }

    #[test]
    fn truncated_input_fails_to_decode() {
        let bytes = encode(&Sample {
            value: 1,
            tag: 2,
            body: vec![1, 2, 3],
        })
        .unwrap();
        let result: CodecResult<Sample> = decode(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(CodecError::Decode(_))));
    }
}
