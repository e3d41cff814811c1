use udl_crypto::CodecError;

/// Errors from key-value store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure that is not an I/O error.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored value could not be decoded.
    #[error("corrupt record under key {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// A value could not be encoded for writing.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A lock guarding the backend was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// Corruption and poisoning cannot be recovered from by retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Corrupt { .. } | StoreError::Poisoned)
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
