use thiserror::Error;
use udl_crypto::CodecError;

/// Errors produced by type operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A message carried an application tag this version does not know.
    #[error("unknown message application tag 0x{0:02x}")]
    UnknownMessageTag(u8),
}

/// Convenience alias for type operations.
pub type TypeResult<T> = Result<T, TypeError>;
