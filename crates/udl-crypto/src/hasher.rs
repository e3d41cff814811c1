use serde::Serialize;

use crate::codec::{self, CodecResult};

/// A raw 32-byte BLAKE3 digest.
pub type Digest = [u8; 32];

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"udl-header-v1"`, `"udl-tx-v1"`)
/// that is prepended to every hash computation. A header and a transaction
/// with identical bytes therefore never share a hash.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for full unit headers (the unit hash).
    pub const HEADER: Self = Self {
        domain: "udl-header-v1",
    };
    /// Hasher for the header bytes covered by author and witness signatures.
    pub const HEADER_SIGNING: Self = Self {
        domain: "udl-header-sig-v1",
    };
    /// Hasher for transactions.
    pub const TRANSACTION: Self = Self {
        domain: "udl-tx-v1",
    };
    /// Hasher for the transaction bytes covered by unlocking signatures.
    pub const TRANSACTION_SIGNING: Self = Self {
        domain: "udl-tx-sig-v1",
    };
    /// Hasher deriving account addresses from public keys.
    pub const ADDRESS: Self = Self {
        domain: "udl-address-v1",
    };
    /// Hasher deriving asset identifiers from symbols.
    pub const ASSET: Self = Self {
        domain: "udl-asset-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        *hasher.finalize().as_bytes()
    }

    /// Hash the canonical encoding of a value with domain separation.
    pub fn hash_encoded<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<Digest> {
        let bytes = codec::encode(value)?;
        Ok(self.hash(&bytes))
    }

    /// Verify that data produces the expected digest.
    pub fn verify(&self, data: &[u8], expected: &Digest) -> bool {
        self.hash(data) == *expected
    }

    /// Raw BLAKE3 hash without domain separation (for low-level use).
    pub fn raw_hash(data: &[u8]) -> Digest {
        *blake3::hash(data).as_bytes()
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}
