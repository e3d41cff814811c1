use std::fmt;

use serde::{Deserialize, Serialize};
use udl_crypto::ContentHasher;

use crate::error::TypeError;

/// 16-byte token-class identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId([u8; 16]);

impl AssetId {
    /// Derive an asset id from its ticker symbol.
    pub fn from_symbol(symbol: &str) -> Self {
        let digest = ContentHasher::ASSET.hash(symbol.as_bytes());
        let mut id = [0u8; 16];
        id.copy_from_slice(&digest[..16]);
        Self(id)
    }

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Parse from a slice, which must be exactly 16 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; 16] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: 16,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({})", self.short_hex())
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A fungible token class, including its per-asset sub-chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Asset {
    pub asset_id: AssetId,
    /// Distinguishes non-fungible instances; zero for fungible tokens.
    pub unique_id: [u8; 16],
    pub chain_id: u64,
}

impl Asset {
    /// Fungible asset on the main chain.
    pub fn new(asset_id: AssetId) -> Self {
        Self {
            asset_id,
            unique_id: [0u8; 16],
            chain_id: 1,
        }
    }
}

/// A unit's position on one asset's sub-chain.
///
/// Heights are only meaningful along a single asset's canonical branch.
/// Cross-asset parent references do not imply a shared order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainIndex {
    pub asset_id: AssetId,
    pub is_main: bool,
    pub index: u64,
}

impl ChainIndex {
    pub fn new(asset_id: AssetId, index: u64) -> Self {
        Self {
            asset_id,
            is_main: true,
            index,
        }
    }

    /// The index directly above this one on the same asset.
    pub fn next(&self) -> Self {
        Self {
            index: self.index + 1,
            ..*self
        }
    }
}

impl fmt::Display for ChainIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.asset_id.short_hex(), self.index)
    }
}
